use crate::prelude::*;

use crate::mi2_codec::{MiValue, Record};
use adapter_protocol::{Source, StackFrame};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    static ref ADDRESS_TOKEN: Regex = Regex::new(r"^0x[0-9a-fA-F]+$").unwrap();
    static ref ADDRESS_ANYWHERE: Regex = Regex::new(r"0x[0-9a-fA-F]+").unwrap();
    static ref LIBC_CSU_INIT: Regex = Regex::new(r"<__libc_csu_init.*>$").unwrap();
}

/// One variable as reported by GDB, before classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarInfo {
    pub name: String,
    pub value: Option<String>,
    pub typ: String,
    pub numchild: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint,
    Step,
    ExitedNormally,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub reason: StopReason,
    pub full_path: String,
    pub line: i64,
}

/// `break-insert` reply: `payload.bkpt.number`.
pub fn parse_add_breakpoint(record: &Record) -> Option<String> {
    if !record.is_done() {
        return None;
    }
    let number = record.payload.get("bkpt")?.string("number");
    if number.is_empty() {
        None
    } else {
        Some(number.to_owned())
    }
}

/// `stack-list-frames` reply: `payload.stack[].frame`.
pub fn parse_stack_trace(record: &Record) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    for item in record.payload.list("stack") {
        let frame = match item.get("frame") {
            Some(frame) => frame,
            None => continue,
        };
        let fullname = frame.string("fullname");
        frames.push(StackFrame {
            id: frame.int("level"),
            name: frame.string("func").to_owned(),
            line: frame.int("line"),
            source: Some(Source {
                name: Path::new(fullname)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned()),
                path: Some(fullname.to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    frames
}

/// `stack-list-variables` reply: the raw names from `payload.variables`
/// (older GDBs report `payload.locals`). Type and child counts require a
/// var-create round trip, which the expander performs.
pub fn parse_frame_variable_names(record: &Record) -> Vec<String> {
    let payload = &record.payload;
    let items = if payload.has("variables") {
        payload.list("variables")
    } else {
        payload.list("locals")
    };
    items
        .iter()
        .map(|v| v.string("name").to_owned())
        .filter(|name| !name.is_empty())
        .collect()
}

/// `symbol-info-variables` reply: symbol names from `payload.symbols.debug[]`
/// whose filename ends in one of the user's main-file suffixes.
pub fn parse_global_variable_names(record: &Record, suffixes: &[&str]) -> Vec<String> {
    let mut names = Vec::new();
    let debug = match record.payload.get("symbols") {
        Some(symbols) => symbols.list("debug"),
        None => return names,
    };
    for entry in debug {
        let filename = entry.string("filename");
        if !suffixes.iter().any(|s| filename.ends_with(s)) {
            continue;
        }
        for symbol in entry.list("symbols") {
            let name = symbol.string("name");
            if !name.is_empty() {
                names.push(name.to_owned());
            }
        }
    }
    names
}

/// `var-create` reply: `payload.{name, value, type, numchild|has_more}`.
pub fn parse_var_create(record: &Record) -> Option<VarInfo> {
    if !record.is_done() {
        return None;
    }
    let payload = &record.payload;
    if !payload.has("name") {
        return None;
    }
    let numchild = if payload.has("numchild") {
        payload.int("numchild")
    } else {
        payload.int("has_more")
    };
    Some(VarInfo {
        name: payload.string("name").to_owned(),
        value: if payload.has("value") {
            Some(payload.string("value").to_owned())
        } else {
            None
        },
        typ: payload.string("type").to_owned(),
        numchild,
    })
}

/// `var-list-children` reply: `payload.children[].child`, names normalized.
pub fn parse_var_children(record: &Record) -> Vec<VarInfo> {
    let mut children = Vec::new();
    for item in record.payload.list("children") {
        let child = match item.get("child") {
            Some(child) => child,
            None => continue,
        };
        children.push(VarInfo {
            name: normalize_child_name(child.string("name")),
            value: if child.has("value") {
                Some(child.string("value").to_owned())
            } else {
                None
            },
            typ: child.string("type").to_owned(),
            numchild: child.int("numchild"),
        });
    }
    children
}

/// `data-evaluate-expression` reply: `payload.value`.
pub fn parse_evaluated_value(record: &Record) -> Option<String> {
    if !record.is_done() || !record.payload.has("value") {
        return None;
    }
    Some(record.payload.string("value").to_owned())
}

/// `thread-info` reply: `payload.current-thread-id`.
pub fn parse_current_thread(record: &Record) -> Option<String> {
    let id = record.payload.string("current-thread-id");
    if id.is_empty() {
        None
    } else {
        Some(id.to_owned())
    }
}

/// `*stopped` payload → stop outcome.
pub fn parse_stopped_event(payload: &MiValue) -> StopOutcome {
    let reason = match payload.string("reason") {
        "breakpoint-hit" => StopReason::Breakpoint,
        "end-stepping-range" | "function-finished" => StopReason::Step,
        "exited-normally" => StopReason::ExitedNormally,
        _ => StopReason::Unknown,
    };
    let (full_path, line) = match payload.get("frame") {
        Some(frame) => (frame.string("fullname").to_owned(), frame.int("line")),
        None => (String::new(), 0),
    };
    StopOutcome {
        reason,
        full_path,
        line,
    }
}

/// GDB child names come back as `structName.left`, `dynamicInt.*(int *)0x...`
/// or `array.0`. Only the part after the last `.` is interesting:
/// a leading `*` means the child is the dereferenced parent, a leading digit
/// means an index.
pub fn normalize_child_name(name: &str) -> String {
    let index = match name.rfind('.') {
        Some(index) => index,
        None => return name.to_owned(),
    };
    let tail = &name[index + 1..];
    match tail.chars().next() {
        Some('*') => {
            let parent = &name[..index];
            let parent = parent.rfind('.').map(|i| &parent[i + 1..]).unwrap_or(parent);
            format!("*{}", parent)
        }
        Some(c) if c.is_ascii_digit() => {
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits
        }
        _ => tail.to_owned(),
    }
}

/// A value is an address when its first whitespace-delimited token is a hex
/// literal, or when it prints as a smart pointer
/// (`std::unique_ptr<Item> = {get() = 0x55555556ceb0}`).
pub fn is_address(value: &str) -> bool {
    if value.starts_with("std::unique_ptr")
        || value.starts_with("std::shared_ptr")
        || value.starts_with("std::weak_ptr")
    {
        return true;
    }
    match value.split_whitespace().next() {
        Some(token) => ADDRESS_TOKEN.is_match(token),
        None => false,
    }
}

/// Extract the first hex address appearing in the value.
pub fn to_address(value: &str) -> String {
    ADDRESS_ANYWHERE
        .find(value)
        .map(|m| m.as_str().to_owned())
        .unwrap_or_default()
}

pub fn is_null_pointer(address: &str) -> bool {
    if address.is_empty() || address == "0x0" {
        return true;
    }
    match address.strip_prefix("0x") {
        Some(digits) => i128::from_str_radix(digits, 16).map_or(false, |n| n == 0),
        None => false,
    }
}

/// Values pointing into process start-up code are artifacts of reading
/// not-yet-initialized pointers; they never become children.
pub fn is_startup_address(value: &str) -> bool {
    value.ends_with("<_start>") || LIBC_CSU_INIT.is_match(value)
}
