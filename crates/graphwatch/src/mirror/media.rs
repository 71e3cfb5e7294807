//! Device, node, port and link info: the media graph proper.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::print::{mark, write_params, write_properties};
use super::ObjectInfo;
use crate::props::Properties;
use crate::types::{bits_serde, Direction, LinkState, NodeState, ObjectType, ParamInfo, Pod};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceChange: u64 {
        const PROPS = 1 << 0;
        const PARAMS = 1 << 1;
    }
}
bits_serde!(DeviceChange, u64);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeChange: u64 {
        const INPUT_PORTS = 1 << 0;
        const OUTPUT_PORTS = 1 << 1;
        const STATE = 1 << 2;
        const PROPS = 1 << 3;
        const PARAMS = 1 << 4;
    }
}
bits_serde!(NodeChange, u64);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PortChange: u64 {
        const PROPS = 1 << 0;
        const PARAMS = 1 << 1;
    }
}
bits_serde!(PortChange, u64);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LinkChange: u64 {
        const STATE = 1 << 0;
        const FORMAT = 1 << 1;
        const PROPS = 1 << 2;
    }
}
bits_serde!(LinkChange, u64);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub id: u32,
    pub change_mask: DeviceChange,
    pub props: Properties,
    pub params: Vec<ParamInfo>,
}

impl ObjectInfo for DeviceInfo {
    const TYPE: ObjectType = ObjectType::Device;
    type Change = DeviceChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> DeviceChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = DeviceChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            ..Self::default()
        });
        info.change_mask = incoming.change_mask;
        if incoming.change_mask.contains(DeviceChange::PROPS) {
            info.props = incoming.props.clone();
        }
        if incoming.change_mask.contains(DeviceChange::PARAMS) {
            info.params = incoming.params.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write_properties(
            out,
            &self.props,
            mark(self.change_mask.contains(DeviceChange::PROPS)),
            true,
        )?;
        write_params(
            out,
            &self.params,
            mark(self.change_mask.contains(DeviceChange::PARAMS)),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    pub id: u32,
    pub max_input_ports: u32,
    pub max_output_ports: u32,
    pub change_mask: NodeChange,
    pub n_input_ports: u32,
    pub n_output_ports: u32,
    pub state: NodeState,
    pub error: Option<String>,
    pub props: Properties,
    pub params: Vec<ParamInfo>,
}

impl ObjectInfo for NodeInfo {
    const TYPE: ObjectType = ObjectType::Node;
    type Change = NodeChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> NodeChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = NodeChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            max_input_ports: incoming.max_input_ports,
            max_output_ports: incoming.max_output_ports,
            ..Self::default()
        });
        let mask = incoming.change_mask;
        info.change_mask = mask;
        if mask.contains(NodeChange::INPUT_PORTS) {
            info.n_input_ports = incoming.n_input_ports;
        }
        if mask.contains(NodeChange::OUTPUT_PORTS) {
            info.n_output_ports = incoming.n_output_ports;
        }
        if mask.contains(NodeChange::STATE) {
            info.state = incoming.state;
            info.error = incoming.error.clone();
        }
        if mask.contains(NodeChange::PROPS) {
            info.props = incoming.props.clone();
        }
        if mask.contains(NodeChange::PARAMS) {
            info.params = incoming.params.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mask = self.change_mask;
        writeln!(
            out,
            "{}\tinput ports: {}/{}",
            mark(mask.contains(NodeChange::INPUT_PORTS)),
            self.n_input_ports,
            self.max_input_ports
        )?;
        writeln!(
            out,
            "{}\toutput ports: {}/{}",
            mark(mask.contains(NodeChange::OUTPUT_PORTS)),
            self.n_output_ports,
            self.max_output_ports
        )?;
        write!(
            out,
            "{}\tstate: \"{}\"",
            mark(mask.contains(NodeChange::STATE)),
            self.state.as_str()
        )?;
        match (&self.state, &self.error) {
            (NodeState::Error, Some(error)) => writeln!(out, " \"{}\"", error)?,
            _ => writeln!(out)?,
        }
        write_properties(out, &self.props, mark(mask.contains(NodeChange::PROPS)), true)?;
        write_params(out, &self.params, mark(mask.contains(NodeChange::PARAMS)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortInfo {
    pub id: u32,
    pub direction: Direction,
    pub change_mask: PortChange,
    pub props: Properties,
    pub params: Vec<ParamInfo>,
}

impl ObjectInfo for PortInfo {
    const TYPE: ObjectType = ObjectType::Port;
    type Change = PortChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> PortChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = PortChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            direction: incoming.direction,
            ..Self::default()
        });
        info.change_mask = incoming.change_mask;
        if incoming.change_mask.contains(PortChange::PROPS) {
            info.props = incoming.props.clone();
        }
        if incoming.change_mask.contains(PortChange::PARAMS) {
            info.params = incoming.params.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "\tdirection: \"{}\"", self.direction.as_str())?;
        write_properties(
            out,
            &self.props,
            mark(self.change_mask.contains(PortChange::PROPS)),
            true,
        )?;
        write_params(
            out,
            &self.params,
            mark(self.change_mask.contains(PortChange::PARAMS)),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkInfo {
    pub id: u32,
    pub output_node_id: u32,
    pub output_port_id: u32,
    pub input_node_id: u32,
    pub input_port_id: u32,
    pub change_mask: LinkChange,
    pub state: LinkState,
    pub error: Option<String>,
    pub format: Option<Pod>,
    pub props: Properties,
}

impl ObjectInfo for LinkInfo {
    const TYPE: ObjectType = ObjectType::Link;
    type Change = LinkChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> LinkChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = LinkChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            output_node_id: incoming.output_node_id,
            output_port_id: incoming.output_port_id,
            input_node_id: incoming.input_node_id,
            input_port_id: incoming.input_port_id,
            ..Self::default()
        });
        let mask = incoming.change_mask;
        info.change_mask = mask;
        if mask.contains(LinkChange::STATE) {
            info.state = incoming.state;
            info.error = incoming.error.clone();
        }
        if mask.contains(LinkChange::FORMAT) {
            info.format = incoming.format.clone();
        }
        if mask.contains(LinkChange::PROPS) {
            info.props = incoming.props.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mask = self.change_mask;
        writeln!(out, "\toutput-node-id: {}", self.output_node_id)?;
        writeln!(out, "\toutput-port-id: {}", self.output_port_id)?;
        writeln!(out, "\tinput-node-id: {}", self.input_node_id)?;
        writeln!(out, "\tinput-port-id: {}", self.input_port_id)?;
        write!(
            out,
            "{}\tstate: \"{}\"",
            mark(mask.contains(LinkChange::STATE)),
            self.state.as_str()
        )?;
        match (&self.state, &self.error) {
            (LinkState::Error, Some(error)) => writeln!(out, " \"{}\"", error)?,
            _ => writeln!(out)?,
        }
        writeln!(out, "{}\tformat:", mark(mask.contains(LinkChange::FORMAT)))?;
        match &self.format {
            Some(format) => {
                for line in format.to_string().lines() {
                    writeln!(out, "\t\t{}", line)?;
                }
            }
            None => writeln!(out, "\t\tnone")?,
        }
        write_properties(out, &self.props, mark(mask.contains(LinkChange::PROPS)), true)
    }
}
