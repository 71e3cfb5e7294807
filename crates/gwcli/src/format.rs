//! Text rendering of globals and notifications.

use std::fmt::Write as _;

use graphwatch::mirror::print;
use graphwatch::{Global, Notification, Permission, ID_ANY};

/// `\tid N, type T/V` followed by the global's properties.
pub fn global(global: &Global) -> String {
    let mut out = format!("\tid {}, type {}/{}\n", global.id, global.type_tag, global.version);
    let _ = print::write_properties(&mut out, &global.props, ' ', false);
    out
}

pub fn permissions(list: &[Permission]) -> String {
    let mut out = String::new();
    for permission in list {
        if permission.id == ID_ANY {
            out.push_str("  default:");
        } else {
            let _ = write!(out, "  {}:", permission.id);
        }
        let _ = writeln!(out, " {:08x}", permission.permissions.bits());
    }
    out
}

fn indented(text: &str, prefix: &str) -> String {
    text.lines().map(|line| format!("{}{}\n", prefix, line)).collect()
}

/// Render a notification from remote `remote`.
///
/// `InfoReady` is not handled here; it needs the connection to describe the
/// object. Notifications with nothing to show render as `None`.
pub fn notification(remote: u32, notification: &Notification) -> Option<String> {
    let text = match notification {
        Notification::GlobalAdded(g) => format!("remote {} added global: {}", remote, global(g)),
        Notification::GlobalRemoved(g) => format!("remote {} removed global: {}", remote, global(g)),
        Notification::UnknownGlobalRemoved { id } => {
            format!("remote {} removed unknown global {}\n", remote, id)
        }
        Notification::BindFailed { error, .. } => format!("Error: \"{}\"\n", error),
        Notification::RemoteNamed { name } => format!("remote {} is named '{}'\n", remote, name),
        Notification::InfoChanged { id, object_type, .. } => {
            format!("remote {} {} {} changed\n", remote, object_type, id)
        }
        Notification::Param {
            global,
            proxy,
            id,
            index,
            param,
            ..
        } => format!(
            "remote {} object {} param {} index {}\n{}",
            remote,
            global.map_or_else(|| format!("@proxy:{}", proxy), |g| g.to_string()),
            id,
            index,
            indented(&param.to_string(), "  ")
        ),
        Notification::Permissions {
            global,
            proxy,
            index,
            permissions: list,
        } => format!(
            "remote {} client {} index {}\n{}",
            remote,
            global.map_or_else(|| format!("@proxy:{}", proxy), |g| g.to_string()),
            index,
            permissions(list)
        ),
        Notification::MetadataProperty {
            global,
            proxy,
            subject,
            key,
            type_,
            value,
        } => {
            let object = global.map_or_else(|| format!("@proxy:{}", proxy), |g| g.to_string());
            match (key, value) {
                (None, _) => format!("remote {} metadata {} cleared subject {}\n", remote, object, subject),
                (Some(key), None) => {
                    format!("remote {} metadata {} {}: {} removed\n", remote, object, subject, key)
                }
                (Some(key), Some(value)) => format!(
                    "remote {} metadata {} {}: {} = \"{}\" ({})\n",
                    remote,
                    object,
                    subject,
                    key,
                    value,
                    type_.as_deref().unwrap_or("")
                ),
            }
        }
        Notification::Bound { .. }
        | Notification::InfoReady { .. }
        | Notification::SyncDone { .. }
        | Notification::ObjectError { .. }
        | Notification::ProxyDestroyed { .. } => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphwatch::{ObjectType, Permissions, Pod, Properties, ProxyId};

    fn node() -> Global {
        Global::new(
            3,
            Permissions::R | Permissions::X,
            ObjectType::Node.type_tag().to_string(),
            3,
            Properties::from([("node.name", "speakers")]),
        )
    }

    #[test]
    fn test_global_line() {
        assert_eq!(
            global(&node()),
            "\tid 3, type PipeWire:Interface:Node/3\n \t\tnode.name = \"speakers\"\n"
        );
    }

    #[test]
    fn test_added_and_removed() {
        let added = notification(0, &Notification::GlobalAdded(node())).unwrap();
        assert!(added.starts_with("remote 0 added global: \tid 3"));
        let removed = notification(0, &Notification::UnknownGlobalRemoved { id: 9 }).unwrap();
        assert_eq!(removed, "remote 0 removed unknown global 9\n");
    }

    #[test]
    fn test_permission_listing() {
        let text = permissions(&[
            Permission::new(ID_ANY, Permissions::R),
            Permission::new(31, Permissions::R | Permissions::W | Permissions::X),
        ]);
        assert_eq!(text, "  default: 00000100\n  31: 000001c0\n");
    }

    #[test]
    fn test_param_pod_is_indented() {
        let text = notification(
            1,
            &Notification::Param {
                global: Some(3),
                proxy: ProxyId(2),
                seq: 0,
                id: 4,
                index: 0,
                next: 1,
                param: Pod(serde_json::json!({ "rate": 48000 })),
            },
        )
        .unwrap();
        assert!(text.starts_with("remote 1 object 3 param 4 index 0\n  {"));
        assert!(text.contains("    \"rate\": 48000"));
    }

    #[test]
    fn test_quiet_notifications() {
        assert!(notification(0, &Notification::SyncDone { seq: 1 }).is_none());
        assert!(notification(0, &Notification::Bound { id: 3, proxy: ProxyId(2) }).is_none());
    }
}
