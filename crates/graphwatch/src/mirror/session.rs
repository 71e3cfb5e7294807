//! Session manager objects: sessions, endpoints and endpoint streams.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::print::{mark, write_params, write_properties};
use super::ObjectInfo;
use crate::props::Properties;
use crate::types::{bits_serde, Direction, ObjectType, ParamInfo, Pod};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SessionChange: u64 {
        const PROPS = 1 << 0;
        const PARAMS = 1 << 1;
    }
}
bits_serde!(SessionChange, u64);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EndpointChange: u64 {
        const STREAMS = 1 << 0;
        const SESSION = 1 << 1;
        const PROPS = 1 << 2;
        const PARAMS = 1 << 3;
    }
}
bits_serde!(EndpointChange, u64);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EndpointStreamChange: u64 {
        const LINK_PARAMS = 1 << 0;
        const PROPS = 1 << 1;
        const PARAMS = 1 << 2;
    }
}
bits_serde!(EndpointStreamChange, u64);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    pub id: u32,
    pub change_mask: SessionChange,
    pub props: Properties,
    pub params: Vec<ParamInfo>,
}

impl ObjectInfo for SessionInfo {
    const TYPE: ObjectType = ObjectType::Session;
    type Change = SessionChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> SessionChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = SessionChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            ..Self::default()
        });
        info.change_mask = incoming.change_mask;
        if incoming.change_mask.contains(SessionChange::PROPS) {
            info.props = incoming.props.clone();
        }
        if incoming.change_mask.contains(SessionChange::PARAMS) {
            info.params = incoming.params.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write_properties(
            out,
            &self.props,
            mark(self.change_mask.contains(SessionChange::PROPS)),
            true,
        )?;
        write_params(
            out,
            &self.params,
            mark(self.change_mask.contains(SessionChange::PARAMS)),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointInfo {
    pub id: u32,
    pub name: String,
    pub media_class: String,
    pub direction: Direction,
    pub flags: u32,
    pub change_mask: EndpointChange,
    pub n_streams: u32,
    pub session_id: u32,
    pub props: Properties,
    pub params: Vec<ParamInfo>,
}

impl ObjectInfo for EndpointInfo {
    const TYPE: ObjectType = ObjectType::Endpoint;
    type Change = EndpointChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> EndpointChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = EndpointChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            name: incoming.name.clone(),
            media_class: incoming.media_class.clone(),
            direction: incoming.direction,
            flags: incoming.flags,
            ..Self::default()
        });
        let mask = incoming.change_mask;
        info.change_mask = mask;
        if mask.contains(EndpointChange::STREAMS) {
            info.n_streams = incoming.n_streams;
        }
        if mask.contains(EndpointChange::SESSION) {
            info.session_id = incoming.session_id;
        }
        if mask.contains(EndpointChange::PROPS) {
            info.props = incoming.props.clone();
        }
        if mask.contains(EndpointChange::PARAMS) {
            info.params = incoming.params.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mask = self.change_mask;
        let direction = match self.direction {
            Direction::Output => "source",
            Direction::Input => "sink",
        };
        writeln!(out, "\tname: {}", self.name)?;
        writeln!(out, "\tmedia-class: {}", self.media_class)?;
        writeln!(out, "\tdirection: {}", direction)?;
        writeln!(out, "\tflags: 0x{:x}", self.flags)?;
        writeln!(
            out,
            "{}\tstreams: {}",
            mark(mask.contains(EndpointChange::STREAMS)),
            self.n_streams
        )?;
        writeln!(
            out,
            "{}\tsession: {}",
            mark(mask.contains(EndpointChange::SESSION)),
            self.session_id
        )?;
        write_properties(out, &self.props, mark(mask.contains(EndpointChange::PROPS)), true)?;
        write_params(out, &self.params, mark(mask.contains(EndpointChange::PARAMS)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointStreamInfo {
    pub id: u32,
    pub endpoint_id: u32,
    pub name: String,
    pub change_mask: EndpointStreamChange,
    pub link_params: Option<Pod>,
    pub props: Properties,
    pub params: Vec<ParamInfo>,
}

impl ObjectInfo for EndpointStreamInfo {
    const TYPE: ObjectType = ObjectType::EndpointStream;
    type Change = EndpointStreamChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> EndpointStreamChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = EndpointStreamChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            endpoint_id: incoming.endpoint_id,
            name: incoming.name.clone(),
            ..Self::default()
        });
        let mask = incoming.change_mask;
        info.change_mask = mask;
        if mask.contains(EndpointStreamChange::LINK_PARAMS) {
            info.link_params = incoming.link_params.clone();
        }
        if mask.contains(EndpointStreamChange::PROPS) {
            info.props = incoming.props.clone();
        }
        if mask.contains(EndpointStreamChange::PARAMS) {
            info.params = incoming.params.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mask = self.change_mask;
        writeln!(out, "\tid: {}", self.id)?;
        writeln!(out, "\tendpoint-id: {}", self.endpoint_id)?;
        writeln!(out, "\tname: {}", self.name)?;
        write_properties(
            out,
            &self.props,
            mark(mask.contains(EndpointStreamChange::PROPS)),
            true,
        )?;
        write_params(
            out,
            &self.params,
            mark(mask.contains(EndpointStreamChange::PARAMS)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamFlags;

    #[test]
    fn test_session_marks_follow_own_bits() {
        let info = SessionInfo::update(
            None,
            &SessionInfo {
                id: 60,
                change_mask: SessionChange::PARAMS,
                props: Properties::from([("session.name", "main")]),
                params: vec![ParamInfo::new(2, ParamFlags::READ)],
            },
        );
        assert!(info.props.is_empty());
        assert_eq!(info.params.len(), 1);

        let mut out = String::new();
        info.describe(&mut out).unwrap();
        assert!(out.starts_with(" \tproperties:\n\t\tnone\n*\tparams: (1)\n"));
    }

    #[test]
    fn test_endpoint_identity_and_groups() {
        let incoming = EndpointInfo {
            id: 61,
            name: "speakers".into(),
            media_class: "Audio/Sink".into(),
            direction: Direction::Input,
            flags: 0x2,
            change_mask: EndpointChange::STREAMS,
            n_streams: 2,
            session_id: 60,
            ..EndpointInfo::default()
        };
        let info = EndpointInfo::update(None, &incoming);
        assert_eq!(info.n_streams, 2);
        assert_eq!(info.session_id, 0);

        let mut out = String::new();
        info.describe(&mut out).unwrap();
        assert!(out.contains("\tdirection: sink\n"));
        assert!(out.contains("\tflags: 0x2\n"));
        assert!(out.contains("*\tstreams: 2\n \tsession: 0\n"));
    }

    #[test]
    fn test_endpoint_stream_link_params_replaced() {
        let first = EndpointStreamInfo::update(
            None,
            &EndpointStreamInfo {
                id: 62,
                endpoint_id: 61,
                name: "playback".into(),
                change_mask: EndpointStreamChange::LINK_PARAMS,
                link_params: Some(Pod(serde_json::json!({ "channels": 2 }))),
                ..EndpointStreamInfo::default()
            },
        );
        let cleared = EndpointStreamInfo::update(
            Some(first),
            &EndpointStreamInfo {
                id: 62,
                change_mask: EndpointStreamChange::LINK_PARAMS,
                link_params: None,
                ..EndpointStreamInfo::default()
            },
        );
        assert!(cleared.link_params.is_none());
        assert_eq!(cleared.name, "playback");
        assert_eq!(cleared.endpoint_id, 61);
    }
}
