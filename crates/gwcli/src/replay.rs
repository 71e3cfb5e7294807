//! Scripted sessions.
//!
//! A script is JSON lines: `{"command": "<shell line>"}` runs a command on
//! the session, `{"deliver": <event>, "remote": <var>}` feeds a server event
//! to a remote (the current one when `remote` is absent). Requests the
//! session sends are recorded, and printed as `>> <json>` when asked for.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use graphwatch::policy::{DefaultNodes, StateStore};
use graphwatch::props::keys;
use graphwatch::{
    Binder, ChannelError, ConnectionError, Connector, Event, InfoRequest, Notification,
    ObjectType, ParamType, Permission, Permissions, Properties, RecordingChannel, Session,
    SessionError, Var,
};
use graphwatch_conf::GraphwatchConfig;

use crate::command::{self, Command, Line};
use crate::format;

/// Hands out channels that record requests instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingConnector {
    channels: Vec<RecordingChannel>,
}

impl RecordingConnector {
    /// Requests sent on any channel since the last call.
    pub fn take_requests(&self) -> Vec<graphwatch::Request> {
        self.channels.iter().flat_map(|channel| channel.take()).collect()
    }
}

impl Connector for RecordingConnector {
    type Channel = RecordingChannel;

    fn open(&mut self, remote_name: Option<&str>) -> Result<RecordingChannel, ChannelError> {
        debug!("opening recording channel for {}", remote_name.unwrap_or("default"));
        let channel = RecordingChannel::new();
        self.channels.push(channel.clone());
        Ok(channel)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ScriptLine {
    Command {
        command: String,
    },
    Deliver {
        deliver: Event,
        #[serde(default)]
        remote: Option<u32>,
    },
}

pub struct Replay<W: Write> {
    session: Session<RecordingConnector>,
    out: W,
    /// Remote name each remote var was opened with.
    names: HashMap<u32, String>,
    default_remote: Option<String>,
    policy: Option<(u32, DefaultNodes)>,
    policy_setup: Option<(StateStore, Duration)>,
    show_requests: bool,
    stopped: bool,
}

impl<W: Write> Replay<W> {
    pub fn new(config: &GraphwatchConfig, show_requests: bool, out: W) -> Self {
        let session = Session::new(RecordingConnector::default(), Arc::new(Binder::standard()))
            .with_eager_bind(config.infra.remote.eager_bind);
        let policy_setup = config.policy.default_nodes.then(|| {
            (
                StateStore::in_dir(&config.infra.paths.state_dir),
                config.policy.save_interval(),
            )
        });
        Self {
            session,
            out,
            names: HashMap::new(),
            default_remote: config.infra.remote.name.clone(),
            policy: None,
            policy_setup,
            show_requests,
            stopped: false,
        }
    }

    /// Connect to the configured remote, then play `script` to the end.
    pub fn run<R: BufRead>(&mut self, script: R) -> Result<()> {
        let remote = self.default_remote.clone();
        let text = self.connect(remote.as_deref())?;
        self.out.write_all(text.as_bytes())?;
        self.emit_requests()?;

        for (number, line) in script.lines().enumerate() {
            let line = line.context("Failed to read script")?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: ScriptLine = serde_json::from_str(&line)
                .with_context(|| format!("line {}: invalid script entry", number + 1))?;
            match entry {
                ScriptLine::Command { command } => self.command(&command)?,
                ScriptLine::Deliver { deliver, remote } => self.deliver(remote, deliver)?,
            }
            self.emit_requests()?;
            if self.stopped {
                info!("no remote left, stopping at line {}", number + 1);
                break;
            }
        }
        self.finish()
    }

    /// Run one shell line, then sync the current remote.
    pub fn command(&mut self, text: &str) -> Result<()> {
        match self.execute(text) {
            Ok(output) => self.out.write_all(output.as_bytes())?,
            Err(err) => writeln!(self.out, "Error: \"{}\"", err)?,
        }
        match self.session.current_connection_mut() {
            Ok(conn) => {
                if let Err(err) = conn.sync() {
                    warn!("sync after command failed: {}", err);
                }
            }
            Err(_) => self.stopped = true,
        }
        Ok(())
    }

    /// Feed one server event to `remote` (the current remote for `None`).
    pub fn deliver(&mut self, remote: Option<u32>, event: Event) -> Result<()> {
        let Some(remote) = remote.or(self.session.current()) else {
            writeln!(self.out, "Error: \"no remote to deliver to\"")?;
            return Ok(());
        };
        match self.session.handle_event(remote, event) {
            Ok(notifications) => self.notify(remote, notifications)?,
            Err(err @ SessionError::Fatal { .. }) => {
                writeln!(self.out, "Error: \"{}\"", err)?;
                self.drop_policy(remote);
                if self.session.current().is_none() {
                    self.stopped = true;
                }
            }
            Err(err) => writeln!(self.out, "Error: \"{}\"", err)?,
        }
        Ok(())
    }

    /// Save pending policy state and close every remote.
    pub fn finish(&mut self) -> Result<()> {
        if let Some((remote, _)) = self.policy {
            self.drop_policy(remote);
        }
        for (remote, notification) in self.session.shutdown() {
            debug!("remote {} shutdown: {:?}", remote, notification);
        }
        self.emit_requests()?;
        self.out.flush()?;
        Ok(())
    }

    fn notify(&mut self, remote: u32, notifications: Vec<Notification>) -> Result<()> {
        let now = Instant::now();
        for notification in &notifications {
            let text = match notification {
                Notification::InfoReady { id, .. } => self
                    .session
                    .connection_mut(remote)
                    .map(|conn| conn.describe(*id))
                    .transpose()?,
                other => format::notification(remote, other),
            };
            if let Some(text) = text {
                self.out.write_all(text.as_bytes())?;
            }

            if let Some((policy_remote, policy)) = self.policy.as_mut() {
                if *policy_remote == remote {
                    if let Some(conn) = self.session.connection_mut(remote) {
                        if let Err(err) = policy.on_notification(conn, notification, now) {
                            warn!("default-nodes policy: {}", err);
                        }
                    }
                }
            }
        }
        if let Some((_, policy)) = self.policy.as_mut() {
            if let Err(err) = policy.poll_save(now) {
                warn!("default-nodes policy: {}", err);
            }
        }
        Ok(())
    }

    fn emit_requests(&mut self) -> Result<()> {
        let requests = self.session.connector().take_requests();
        if !self.show_requests {
            return Ok(());
        }
        for request in requests {
            writeln!(self.out, ">> {}", serde_json::to_string(&request)?)?;
        }
        Ok(())
    }

    fn drop_policy(&mut self, remote: u32) {
        if !matches!(self.policy, Some((r, _)) if r == remote) {
            return;
        }
        if let Some((_, mut policy)) = self.policy.take() {
            if let Err(err) = policy.flush() {
                warn!("default-nodes policy: {}", err);
            }
        }
    }

    fn connect(&mut self, name: Option<&str>) -> Result<String> {
        let id = self.session.connect(name)?;
        let name = name.unwrap_or("default").to_string();
        let text = format!("{} = @remote:{}\n", id, name);
        self.names.insert(id, name);
        if self.policy.is_none() {
            if let Some((store, interval)) = self.policy_setup.take() {
                debug!("default-nodes policy on remote {} ({})", id, store.path().display());
                self.policy = Some((id, DefaultNodes::new(store, interval)));
            }
        }
        Ok(text)
    }

    fn execute(&mut self, text: &str) -> Result<String> {
        let Some(line) = command::parse(text)? else {
            return Ok(String::new());
        };
        match line.command {
            Command::Help => Ok(command::help_text()),
            Command::LoadModule | Command::UnloadModule | Command::ExportNode => {
                bail!("Command \"{}\" not yet implemented", line.word)
            }
            Command::Connect => {
                let args = line.split(1);
                let name = args.first().copied().or(self.default_remote.as_deref()).map(str::to_string);
                self.connect(name.as_deref())
            }
            Command::Disconnect => self.disconnect(&line),
            Command::ListRemotes => Ok(self.list_remotes()),
            Command::SwitchRemote => {
                let idx = match line.split(1).first() {
                    Some(word) => command::parse_id(word)?,
                    None => 0,
                };
                self.session.switch_remote(idx)?;
                Ok(String::new())
            }
            Command::ListObjects => {
                let filter = line.split(1).first().copied();
                let conn = self.session.current_connection_mut()?;
                Ok(conn.globals().matching(filter).map(format::global).collect())
            }
            Command::Info => self.info(&line),
            Command::CreateDevice => self.create_object(&line, ObjectType::Device),
            Command::CreateNode => self.create_object(&line, ObjectType::Node),
            Command::Destroy => {
                let id = object_arg(&line, "<object-id>")?;
                let conn = self.session.current_connection_mut()?;
                conn.destroy_global(id).map_err(|err| command_error(&line, err))?;
                Ok(String::new())
            }
            Command::CreateLink => self.create_link(&line),
            Command::EnumParams => {
                let args = line.split(2);
                if args.len() < 2 {
                    return Err(line.usage("<object-id> <param-id>"));
                }
                let id = command::parse_id(args[0])?;
                let param_id = match args[1].parse::<u32>() {
                    Ok(param_id) => param_id,
                    Err(_) => args[1].parse::<ParamType>().map_err(|e| anyhow!(e))? as u32,
                };
                let conn = self.session.current_connection_mut()?;
                conn.enum_params(id, param_id)
                    .map_err(|err| command_error(&line, err))?;
                Ok(String::new())
            }
            Command::Permissions => {
                let args = line.split(3);
                if args.len() < 3 {
                    return Err(line.usage("<client-id> <object> <permission>"));
                }
                let id = command::parse_id(args[0])?;
                let object = parse_object(args[1])?;
                let bits = command::parse_id(args[2])?;
                let conn = self.session.current_connection_mut()?;
                conn.update_permissions(
                    id,
                    vec![Permission::new(object, Permissions::from_bits_truncate(bits))],
                )
                .map_err(|err| command_error(&line, err))?;
                Ok(String::new())
            }
            Command::GetPermissions => {
                let id = object_arg(&line, "<client-id>")?;
                let conn = self.session.current_connection_mut()?;
                conn.get_permissions(id)
                    .map_err(|err| command_error(&line, err))?;
                Ok(String::new())
            }
        }
    }

    fn disconnect(&mut self, line: &Line<'_>) -> Result<String> {
        let remote = match line.split(1).first() {
            Some(word) => Some(command::parse_id(word)?),
            None => self.session.current(),
        };
        if let Some(remote) = remote {
            self.drop_policy(remote);
        }
        self.session.disconnect(remote)?;
        if let Some(remote) = remote {
            self.names.remove(&remote);
        }
        Ok(String::new())
    }

    fn list_remotes(&self) -> String {
        self.session
            .remotes()
            .map(|(id, conn)| {
                format!(
                    "\t{} = @remote:{} '{}'\n",
                    id,
                    self.names.get(&id).map(String::as_str).unwrap_or("default"),
                    conn.name().unwrap_or("")
                )
            })
            .collect()
    }

    fn info(&mut self, line: &Line<'_>) -> Result<String> {
        let Some(target) = line.split(2).first().copied() else {
            return Err(line.usage("<object-id>|all"));
        };
        let conn = self.session.current_connection_mut()?;
        if target == "all" {
            let ids: Vec<u32> = conn.globals().iter().map(|g| g.id).collect();
            let mut out = String::new();
            for id in ids {
                match conn.request_info(id) {
                    Ok(InfoRequest::Ready(text)) => out.push_str(&text),
                    Ok(InfoRequest::Pending) => {}
                    Err(err) => eprintln!("info: {}", err),
                }
            }
            return Ok(out);
        }
        let id = command::parse_id(target)?;
        match conn.request_info(id).map_err(|err| command_error(line, err))? {
            InfoRequest::Ready(text) => Ok(text),
            InfoRequest::Pending => Ok(String::new()),
        }
    }

    fn create_object(&mut self, line: &Line<'_>, object_type: ObjectType) -> Result<String> {
        let args = line.split(2);
        let Some(factory) = args.first() else {
            return Err(line.usage("<factory-name> [<properties>]"));
        };
        let props = args.get(1).map(|p| Properties::parse(p)).unwrap_or_default();
        let var = self.session.create_object(factory, object_type, props)?;
        proxy_var(&self.session, var)
    }

    fn create_link(&mut self, line: &Line<'_>) -> Result<String> {
        let args = line.split(5);
        if args.len() < 4 {
            return Err(line.usage("<node-id> <port> <node-id> <port> [<properties>]"));
        }
        let mut props = args.get(4).map(|p| Properties::parse(p)).unwrap_or_default();
        props.set(keys::LINK_OUTPUT_NODE, args[0]);
        props.set(keys::LINK_OUTPUT_PORT, args[1]);
        props.set(keys::LINK_INPUT_NODE, args[2]);
        props.set(keys::LINK_INPUT_PORT, args[3]);
        let var = self.session.create_object("link-factory", ObjectType::Link, props)?;
        proxy_var(&self.session, var)
    }
}

fn object_arg(line: &Line<'_>, synopsis: &str) -> Result<u32> {
    match line.split(2).first() {
        Some(word) => command::parse_id(word),
        None => Err(line.usage(synopsis)),
    }
}

fn proxy_var(session: &Session<RecordingConnector>, var: u32) -> Result<String> {
    match session.var(var) {
        Some(Var::Proxy { proxy, .. }) => Ok(format!("{} = @proxy:{}\n", var, proxy)),
        _ => bail!("var {} is not a proxy", var),
    }
}

/// Object id as typed; `-1` means any object.
fn parse_object(word: &str) -> Result<u32> {
    match word.parse::<i64>() {
        Ok(-1) => Ok(graphwatch::ID_ANY),
        Ok(id) => u32::try_from(id).map_err(|_| anyhow!("\"{}\" is not a valid id", word)),
        Err(_) => bail!("\"{}\" is not a valid id", word),
    }
}

fn command_error(line: &Line<'_>, err: ConnectionError) -> anyhow::Error {
    match err {
        ConnectionError::UnknownGlobal(id) => anyhow!("{}: unknown global {}", line.word, id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay() -> Replay<Vec<u8>> {
        let mut config = GraphwatchConfig::default();
        config.policy.default_nodes = false;
        Replay::new(&config, true, Vec::new())
    }

    fn output(replay: &Replay<Vec<u8>>) -> String {
        String::from_utf8_lossy(&replay.out).into_owned()
    }

    #[test]
    fn test_script_line_shapes() {
        let line: ScriptLine = serde_json::from_str(r#"{"command":"ls"}"#).unwrap();
        assert!(matches!(line, ScriptLine::Command { .. }));
        let line: ScriptLine =
            serde_json::from_str(r#"{"deliver":{"event":"global_removed","id":4},"remote":0}"#).unwrap();
        assert!(matches!(
            line,
            ScriptLine::Deliver { remote: Some(0), deliver: Event::GlobalRemoved { id: 4 } }
        ));
    }

    #[test]
    fn test_connect_prints_var() {
        let mut replay = replay();
        replay.command("connect pipewire-0").unwrap();
        assert_eq!(output(&replay), "0 = @remote:pipewire-0\n");
        replay.emit_requests().unwrap();
        assert!(output(&replay).contains(r#">> {"request":"get_registry""#));
    }

    #[test]
    fn test_not_implemented_commands() {
        let mut replay = replay();
        replay.command("connect").unwrap();
        replay.command("lm libpipewire-module-foo").unwrap();
        assert!(output(&replay).contains("Error: \"Command \"lm\" not yet implemented\"\n"));
    }

    #[test]
    fn test_unknown_global_names_command() {
        let mut replay = replay();
        replay.command("connect").unwrap();
        replay.command("destroy 42").unwrap();
        assert!(output(&replay).contains("Error: \"destroy: unknown global 42\"\n"));
    }

    #[test]
    fn test_parse_object_any() {
        assert_eq!(parse_object("-1").unwrap(), graphwatch::ID_ANY);
        assert_eq!(parse_object("12").unwrap(), 12);
        assert!(parse_object("-7").is_err());
    }
}
