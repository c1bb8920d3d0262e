use crate::prelude::*;

/// A parsed MI2 value: a scalar string, a tuple of named results, or a list.
/// Tuple keys are unique within one tuple and keep their wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum MiValue {
    Str(String),
    Tuple(Vec<(String, MiValue)>),
    List(Vec<MiValue>),
}

static EMPTY_LIST: [MiValue; 0] = [];

impl MiValue {
    pub fn get(&self, key: &str) -> Option<&MiValue> {
        match self {
            MiValue::Tuple(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// String value of `key`, or "" when absent or not a scalar.
    pub fn string(&self, key: &str) -> &str {
        match self.get(key) {
            Some(MiValue::Str(s)) => s,
            _ => "",
        }
    }

    /// Integer value of `key`, or 0 when absent or unparsable.
    pub fn int(&self, key: &str) -> i64 {
        self.string(key).parse().unwrap_or(0)
    }

    pub fn list(&self, key: &str) -> &[MiValue] {
        match self.get(key) {
            Some(MiValue::List(items)) => items,
            _ => &EMPTY_LIST,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MiValue::Str(s) => s,
            _ => "",
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn empty_tuple() -> MiValue {
        MiValue::Tuple(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Result,
    Exec,
    Status,
    Notify,
    Console,
    Target,
    Log,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub kind: RecordKind,
    pub class: String,
    pub sequence: Option<u64>,
    pub payload: MiValue,
}

impl Record {
    pub fn is_done(&self) -> bool {
        self.class == "done"
    }

    /// Convert a class=error reply into an Err carrying GDB's message.
    pub fn into_result(self) -> Result<Record, Error> {
        if self.class == "error" {
            let msg = self.payload.string("msg");
            if msg.is_empty() {
                bail!(format!("gdb error: {:?}", self.payload));
            }
            bail!(str_error(msg));
        }
        Ok(self)
    }
}

const TERMINATOR: &str = "(gdb)";

/// Parse one line of GDB output. Returns None for the `(gdb)` terminator,
/// blank lines, and anything that is not an MI2 record.
pub fn parse_record(line: &str) -> Option<Record> {
    let line = line.trim_end();
    if line.is_empty() || line == TERMINATOR {
        return None;
    }

    let bytes = line.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let sequence = if pos > 0 {
        line[..pos].parse::<u64>().ok()
    } else {
        None
    };

    let mut cur = Cursor::new(bytes, pos);
    let kind = match cur.bump()? {
        b'^' => RecordKind::Result,
        b'*' => RecordKind::Exec,
        b'+' => RecordKind::Status,
        b'=' => RecordKind::Notify,
        b'~' => RecordKind::Console,
        b'@' => RecordKind::Target,
        b'&' => RecordKind::Log,
        _ => return None,
    };

    match kind {
        RecordKind::Console | RecordKind::Target | RecordKind::Log => {
            let text = cur.parse_cstring()?;
            Some(Record {
                kind,
                class: String::new(),
                sequence,
                payload: MiValue::Str(text),
            })
        }
        _ => {
            let class = cur.parse_ident();
            if class.is_empty() {
                return None;
            }
            let payload = if cur.eat(b',') {
                MiValue::Tuple(cur.parse_results())
            } else {
                MiValue::empty_tuple()
            };
            Some(Record {
                kind,
                class,
                sequence,
                payload,
            })
        }
    }
}

struct Cursor<'a> {
    s: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a [u8], pos: usize) -> Cursor<'a> {
        Cursor { s, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_ident(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.s[start..self.pos]).into_owned()
    }

    // `key=value(,key=value)*` up to the end of the enclosing construct.
    fn parse_results(&mut self) -> Vec<(String, MiValue)> {
        let mut results = Vec::new();
        loop {
            let key = self.parse_ident();
            if key.is_empty() || !self.eat(b'=') {
                break;
            }
            match self.parse_value() {
                Some(value) => results.push((key, value)),
                None => break,
            }
            if !self.eat(b',') {
                break;
            }
        }
        results
    }

    fn parse_value(&mut self) -> Option<MiValue> {
        match self.peek()? {
            b'"' => self.parse_cstring().map(MiValue::Str),
            b'{' => {
                self.pos += 1;
                let pairs = if self.peek() == Some(b'}') {
                    Vec::new()
                } else {
                    self.parse_results()
                };
                self.eat(b'}');
                Some(MiValue::Tuple(pairs))
            }
            b'[' => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat(b']') {
                    loop {
                        match self.peek()? {
                            b'"' | b'{' | b'[' => items.push(self.parse_value()?),
                            // Lists may contain results; each becomes a
                            // single-entry tuple, e.g. stack=[frame={...},...].
                            _ => {
                                let key = self.parse_ident();
                                if key.is_empty() || !self.eat(b'=') {
                                    return None;
                                }
                                let value = self.parse_value()?;
                                items.push(MiValue::Tuple(vec![(key, value)]));
                            }
                        }
                        if !self.eat(b',') {
                            break;
                        }
                    }
                    self.eat(b']');
                }
                Some(MiValue::List(items))
            }
            _ => None,
        }
    }

    fn parse_cstring(&mut self) -> Option<String> {
        if !self.eat(b'"') {
            return None;
        }
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.bump()? {
                b'"' => break,
                b'\\' => match self.bump()? {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'f' => out.push(0x0c),
                    b'v' => out.push(0x0b),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'"' => out.push(b'"'),
                    b'\'' => out.push(b'\''),
                    b'\\' => out.push(b'\\'),
                    d @ b'0'..=b'7' => {
                        // up to three octal digits
                        let mut code = (d - b'0') as u32;
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    code = code * 8 + (d - b'0') as u32;
                                    self.pos += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(code as u8);
                    }
                    other => out.push(other),
                },
                b => out.push(b),
            }
        }
        Some(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Serialize an MI2 command line: `<token>-<operation>[ <arg>]*\n`.
/// An argument is quoted only when it has to be; GDB treats `1` and `"1"`
/// differently, as it does `--thread` and `"--thread"`.
pub fn serialize_command(token: u64, operation: &str, args: &[String]) -> String {
    let mut line = format!("{}-{}", token, operation);
    for arg in args {
        line.push(' ');
        if needs_quoting(arg) {
            line.push('"');
            for c in arg.chars() {
                match c {
                    '\\' => line.push_str("\\\\"),
                    '"' => line.push_str("\\\""),
                    '\n' => line.push_str("\\n"),
                    '\r' => line.push_str("\\r"),
                    '\t' => line.push_str("\\t"),
                    '\x07' => line.push_str("\\a"),
                    '\x08' => line.push_str("\\b"),
                    '\x0b' => line.push_str("\\v"),
                    '\x0c' => line.push_str("\\f"),
                    c => line.push(c),
                }
            }
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line.push('\n');
    line
}

fn needs_quoting(arg: &str) -> bool {
    arg.is_empty()
        || arg
            .chars()
            .any(|c| " \x07\x08\x0c\n\r\t\x0b\\'\"".contains(c))
}
