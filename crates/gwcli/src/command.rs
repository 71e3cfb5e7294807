//! Command table and line parsing.

use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    LoadModule,
    UnloadModule,
    Connect,
    Disconnect,
    ListRemotes,
    SwitchRemote,
    ListObjects,
    Info,
    CreateDevice,
    CreateNode,
    Destroy,
    CreateLink,
    ExportNode,
    EnumParams,
    Permissions,
    GetPermissions,
}

pub struct CommandSpec {
    pub name: &'static str,
    pub alias: &'static str,
    pub description: &'static str,
    pub command: Command,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "help", alias: "h", description: "Show this help", command: Command::Help },
    CommandSpec { name: "load-module", alias: "lm", description: "Load a module. <module-name> [<module-arguments>]", command: Command::LoadModule },
    CommandSpec { name: "unload-module", alias: "um", description: "Unload a module. <module-var>", command: Command::UnloadModule },
    CommandSpec { name: "connect", alias: "con", description: "Connect to a remote. [<remote-name>]", command: Command::Connect },
    CommandSpec { name: "disconnect", alias: "dis", description: "Disconnect from a remote. [<remote-var>]", command: Command::Disconnect },
    CommandSpec { name: "list-remotes", alias: "lr", description: "List connected remotes.", command: Command::ListRemotes },
    CommandSpec { name: "switch-remote", alias: "sr", description: "Switch between current remotes. [<remote-var>]", command: Command::SwitchRemote },
    CommandSpec { name: "list-objects", alias: "ls", description: "List objects or current remote. [<interface>]", command: Command::ListObjects },
    CommandSpec { name: "info", alias: "i", description: "Get info about an object. <object-id>|all", command: Command::Info },
    CommandSpec { name: "create-device", alias: "cd", description: "Create a device from a factory. <factory-name> [<properties>]", command: Command::CreateDevice },
    CommandSpec { name: "create-node", alias: "cn", description: "Create a node from a factory. <factory-name> [<properties>]", command: Command::CreateNode },
    CommandSpec { name: "destroy", alias: "d", description: "Destroy a global object. <object-id>", command: Command::Destroy },
    CommandSpec { name: "create-link", alias: "cl", description: "Create a link between nodes. <node-id> <port-id> <node-id> <port-id> [<properties>]", command: Command::CreateLink },
    CommandSpec { name: "export-node", alias: "en", description: "Export a local node to the current remote. <node-id> [remote-var]", command: Command::ExportNode },
    CommandSpec { name: "enum-params", alias: "e", description: "Enumerate params of an object <object-id> [<param-id-name>]", command: Command::EnumParams },
    CommandSpec { name: "permissions", alias: "sp", description: "Set permissions for a client <client-id> <object> <permission>", command: Command::Permissions },
    CommandSpec { name: "get-permissions", alias: "gp", description: "Get permissions of a client <client-id>", command: Command::GetPermissions },
];

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line<'a> {
    pub command: Command,
    /// The word as typed, name or alias.
    pub word: &'a str,
    pub args: &'a str,
}

impl<'a> Line<'a> {
    /// Split `args` into at most `max` whitespace-separated fields, the last
    /// one keeping the rest of the line.
    pub fn split(&self, max: usize) -> Vec<&'a str> {
        split_fields(self.args, max)
    }

    pub fn usage(&self, synopsis: &str) -> anyhow::Error {
        anyhow!("{} {}", self.word, synopsis)
    }
}

/// Parse one line. `Ok(None)` for blank lines and comments.
pub fn parse(input: &str) -> Result<Option<Line<'_>>> {
    let input = match input.find('#') {
        Some(pos) => &input[..pos],
        None => input,
    };
    let fields = split_fields(input, 2);
    let Some(word) = fields.first().copied() else {
        return Ok(None);
    };
    let args = fields.get(1).copied().unwrap_or("");

    match COMMANDS.iter().find(|spec| spec.name == word || spec.alias == word) {
        Some(spec) => Ok(Some(Line {
            command: spec.command,
            word,
            args,
        })),
        None => bail!("Command \"{}\" does not exist. Type 'help' for usage.", word),
    }
}

fn split_fields(input: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = input.trim();
    while !rest.is_empty() && fields.len() + 1 < max {
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                rest = "";
            }
        }
    }
    if !rest.is_empty() {
        fields.push(rest);
    }
    fields
}

/// Numeric argument in the forgiving style of the interactive shell.
pub fn parse_id(word: &str) -> Result<u32> {
    word.parse()
        .map_err(|_| anyhow!("\"{}\" is not a valid id", word))
}

pub fn help_text() -> String {
    let mut out = String::from("Available commands:\n");
    for spec in COMMANDS {
        out.push_str(&format!("\t{:<20.20}\t{}\n", spec.name, spec.description));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_aliases_resolve() {
        for spec in COMMANDS {
            assert_eq!(parse(spec.name).unwrap().unwrap().command, spec.command);
            assert_eq!(parse(spec.alias).unwrap().unwrap().command, spec.command);
        }
    }

    #[test]
    fn test_comments_and_blank_lines() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   \t").unwrap(), None);
        assert_eq!(parse("# only a comment").unwrap(), None);
        let line = parse("info 3 # trailing").unwrap().unwrap();
        assert_eq!(line.command, Command::Info);
        assert_eq!(line.args, "3");
    }

    #[test]
    fn test_unknown_command() {
        let err = parse("frobnicate 1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command \"frobnicate\" does not exist. Type 'help' for usage."
        );
    }

    #[test]
    fn test_split_keeps_tail() {
        let line = parse("cn spa-node-factory  node.name=a media.class=Audio/Sink").unwrap().unwrap();
        assert_eq!(
            line.split(2),
            vec!["spa-node-factory", "node.name=a media.class=Audio/Sink"]
        );
        assert_eq!(line.split(1), vec!["spa-node-factory  node.name=a media.class=Audio/Sink"]);
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = help_text();
        assert!(help.starts_with("Available commands:\n"));
        assert_eq!(help.lines().count(), COMMANDS.len() + 1);
    }
}
