//! Text dumps shared by the per-type printers.

use std::fmt;

use crate::props::Properties;
use crate::types::{ParamFlags, ParamInfo, ParamType};

/// `*` when `changed`, a blank otherwise.
pub fn mark(changed: bool) -> char {
    if changed {
        '*'
    } else {
        ' '
    }
}

/// Property block; the `properties:` header is omitted when `header` is false.
pub fn write_properties(
    out: &mut dyn fmt::Write,
    props: &Properties,
    mark: char,
    header: bool,
) -> fmt::Result {
    if header {
        writeln!(out, "{}\tproperties:", mark)?;
    }
    if props.is_empty() {
        if header {
            writeln!(out, "\t\tnone")?;
        }
        return Ok(());
    }
    for (key, value) in props.iter() {
        writeln!(out, "{}\t\t{} = \"{}\"", mark, key, value)?;
    }
    Ok(())
}

pub fn write_params(out: &mut dyn fmt::Write, params: &[ParamInfo], mark: char) -> fmt::Result {
    writeln!(out, "{}\tparams: ({})", mark, params.len())?;
    if params.is_empty() {
        return writeln!(out, "\t\tnone");
    }
    for param in params {
        writeln!(
            out,
            "{}\t  {} ({}) {}{}",
            mark,
            param.id,
            ParamType::name_of(param.id),
            if param.flags.contains(ParamFlags::READ) { 'r' } else { '-' },
            if param.flags.contains(ParamFlags::WRITE) { 'w' } else { '-' },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_properties_with_header() {
        let mut out = String::new();
        write_properties(&mut out, &Properties::new(), '*', true).unwrap();
        assert_eq!(out, "*\tproperties:\n\t\tnone\n");
    }

    #[test]
    fn test_properties_without_header() {
        let mut out = String::new();
        let props = Properties::from([("node.name", "sink")]);
        write_properties(&mut out, &props, ' ', false).unwrap();
        assert_eq!(out, " \t\tnode.name = \"sink\"\n");
    }

    #[test]
    fn test_params_listing() {
        let mut out = String::new();
        let params = [
            ParamInfo::new(3, ParamFlags::READ),
            ParamInfo::new(2, ParamFlags::READWRITE),
        ];
        write_params(&mut out, &params, ' ').unwrap();
        assert_eq!(
            out,
            " \tparams: (2)\n \t  3 (EnumFormat) r-\n \t  2 (Props) rw\n"
        );
    }
}
