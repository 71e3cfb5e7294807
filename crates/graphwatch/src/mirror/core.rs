//! Core, module, factory and client info.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::print::{mark, write_properties};
use super::ObjectInfo;
use crate::props::Properties;
use crate::types::{bits_serde, ObjectType};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CoreChange: u64 {
        const PROPS = 1 << 0;
    }
}
bits_serde!(CoreChange, u64);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModuleChange: u64 {
        const PROPS = 1 << 0;
    }
}
bits_serde!(ModuleChange, u64);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FactoryChange: u64 {
        const PROPS = 1 << 0;
    }
}
bits_serde!(FactoryChange, u64);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClientChange: u64 {
        const PROPS = 1 << 0;
    }
}
bits_serde!(ClientChange, u64);

/// The server itself. The core of a connection is also where the remote name
/// comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreInfo {
    pub id: u32,
    pub cookie: u32,
    pub user_name: String,
    pub host_name: String,
    pub version: String,
    pub name: String,
    pub change_mask: CoreChange,
    pub props: Properties,
}

impl ObjectInfo for CoreInfo {
    const TYPE: ObjectType = ObjectType::Core;
    type Change = CoreChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> CoreChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = CoreChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            cookie: incoming.cookie,
            user_name: incoming.user_name.clone(),
            host_name: incoming.host_name.clone(),
            version: incoming.version.clone(),
            name: incoming.name.clone(),
            ..Self::default()
        });
        info.change_mask = incoming.change_mask;
        if incoming.change_mask.contains(CoreChange::PROPS) {
            info.props = incoming.props.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "\tcookie: {}", self.cookie)?;
        writeln!(out, "\tuser-name: \"{}\"", self.user_name)?;
        writeln!(out, "\thost-name: \"{}\"", self.host_name)?;
        writeln!(out, "\tversion: \"{}\"", self.version)?;
        writeln!(out, "\tname: \"{}\"", self.name)?;
        write_properties(
            out,
            &self.props,
            mark(self.change_mask.contains(CoreChange::PROPS)),
            true,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleInfo {
    pub id: u32,
    pub name: String,
    pub filename: String,
    pub args: Option<String>,
    pub change_mask: ModuleChange,
    pub props: Properties,
}

impl ObjectInfo for ModuleInfo {
    const TYPE: ObjectType = ObjectType::Module;
    type Change = ModuleChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> ModuleChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = ModuleChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            name: incoming.name.clone(),
            filename: incoming.filename.clone(),
            args: incoming.args.clone(),
            ..Self::default()
        });
        info.change_mask = incoming.change_mask;
        if incoming.change_mask.contains(ModuleChange::PROPS) {
            info.props = incoming.props.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "\tname: \"{}\"", self.name)?;
        writeln!(out, "\tfilename: \"{}\"", self.filename)?;
        writeln!(out, "\targs: \"{}\"", self.args.as_deref().unwrap_or("(null)"))?;
        write_properties(
            out,
            &self.props,
            mark(self.change_mask.contains(ModuleChange::PROPS)),
            true,
        )
    }
}

/// A factory advertises which object type it creates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryInfo {
    pub id: u32,
    pub name: String,
    pub type_tag: String,
    pub version: u32,
    pub change_mask: FactoryChange,
    pub props: Properties,
}

impl ObjectInfo for FactoryInfo {
    const TYPE: ObjectType = ObjectType::Factory;
    type Change = FactoryChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> FactoryChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = FactoryChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            name: incoming.name.clone(),
            type_tag: incoming.type_tag.clone(),
            version: incoming.version,
            ..Self::default()
        });
        info.change_mask = incoming.change_mask;
        if incoming.change_mask.contains(FactoryChange::PROPS) {
            info.props = incoming.props.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "\tname: \"{}\"", self.name)?;
        writeln!(out, "\tobject-type: {}/{}", self.type_tag, self.version)?;
        write_properties(
            out,
            &self.props,
            mark(self.change_mask.contains(FactoryChange::PROPS)),
            true,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    pub id: u32,
    pub change_mask: ClientChange,
    pub props: Properties,
}

impl ObjectInfo for ClientInfo {
    const TYPE: ObjectType = ObjectType::Client;
    type Change = ClientChange;

    fn id(&self) -> u32 {
        self.id
    }

    fn change_mask(&self) -> ClientChange {
        self.change_mask
    }

    fn clear_change_mask(&mut self) {
        self.change_mask = ClientChange::empty();
    }

    fn update(cached: Option<Self>, incoming: &Self) -> Self {
        let mut info = cached.unwrap_or_else(|| Self {
            id: incoming.id,
            ..Self::default()
        });
        info.change_mask = incoming.change_mask;
        if incoming.change_mask.contains(ClientChange::PROPS) {
            info.props = incoming.props.clone();
        }
        info
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write_properties(
            out,
            &self.props,
            mark(self.change_mask.contains(ClientChange::PROPS)),
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_update(mask: CoreChange, name: &str) -> CoreInfo {
        CoreInfo {
            id: 0,
            cookie: 1234,
            user_name: "alice".into(),
            host_name: "studio".into(),
            version: "0.3.0".into(),
            name: name.into(),
            change_mask: mask,
            props: Properties::from([("core.daemon", "true")]),
        }
    }

    #[test]
    fn test_identity_copied_only_once() {
        let first = CoreInfo::update(None, &core_update(CoreChange::PROPS, "pipewire-0"));
        let second = CoreInfo::update(Some(first), &core_update(CoreChange::empty(), "renamed"));
        assert_eq!(second.name, "pipewire-0");
        assert_eq!(second.cookie, 1234);
        assert!(second.change_mask.is_empty());
    }

    #[test]
    fn test_props_untouched_without_bit() {
        let first = ClientInfo::update(
            None,
            &ClientInfo {
                id: 4,
                change_mask: ClientChange::PROPS,
                props: Properties::from([("application.name", "mixer")]),
            },
        );
        let second = ClientInfo::update(
            Some(first),
            &ClientInfo {
                id: 4,
                change_mask: ClientChange::empty(),
                props: Properties::new(),
            },
        );
        assert_eq!(second.props.get("application.name"), Some("mixer"));
    }

    #[test]
    fn test_module_describe() {
        let info = ModuleInfo::update(
            None,
            &ModuleInfo {
                id: 2,
                name: "libpipewire-module-protocol-native".into(),
                filename: "/usr/lib/pipewire/module.so".into(),
                args: None,
                change_mask: ModuleChange::PROPS,
                props: Properties::new(),
            },
        );
        let mut out = String::new();
        info.describe(&mut out).unwrap();
        assert!(out.contains("\targs: \"(null)\"\n"));
        assert!(out.contains("*\tproperties:\n\t\tnone\n"));
    }

    #[test]
    fn test_factory_describe_object_type() {
        let info = FactoryInfo {
            id: 5,
            name: "adapter".into(),
            type_tag: ObjectType::Node.type_tag().into(),
            version: 3,
            ..FactoryInfo::default()
        };
        let mut out = String::new();
        info.describe(&mut out).unwrap();
        assert!(out.contains("\tobject-type: PipeWire:Interface:Node/3\n"));
    }
}
