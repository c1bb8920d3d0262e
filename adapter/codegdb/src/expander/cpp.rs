use crate::prelude::*;

use crate::mi2_output::{parse_evaluated_value, parse_var_create, VarInfo};
use crate::mi2_session::{Mi2Session, OPTION_TIMEOUT};
use lazy_static::lazy_static;
use regex::Regex;

const ARRAY_CHILD_VAR: &str = "arrayNameChildren";

lazy_static! {
    static ref STD_ARRAY: Regex = Regex::new(r"std::array<([^,]+),\s*(\d+)\s*>").unwrap();
    static ref C_ARRAY: Regex = Regex::new(r"(\w+)\s*\[\s*(\d+)\s*\]").unwrap();
    static ref OBJECT_KEY: Regex = Regex::new(r"(\w+)\s*=").unwrap();
    static ref SMART_POINTER: Regex =
        Regex::new(r"^std::(unique_ptr|shared_ptr|weak_ptr)<\s*([^,>]+)").unwrap();
    static ref FIRST_TEMPLATE_PARAM: Regex =
        Regex::new(r"\bstd::\w+<\s*([^,\s>]+)(?:\s*,|\s*>)").unwrap();
}

/// `var-list-children` is unreliable for C++ in the presence of access
/// modifiers; structs expand through pretty-printed evaluation and
/// array-likes element by element.
pub(super) async fn list_children(
    mi2: &Mi2Session,
    target: &VarInfo,
    exp: &str,
) -> Result<Vec<VarInfo>, Error> {
    match classify_array_type(&target.typ) {
        Some(kind) => expand_array(mi2, target, exp, kind).await,
        None => expand_struct(mi2, exp).await,
    }
}

/// The pretty-printed form is `{k1 = v1, k2 = v2, ...}`; each key is read
/// back as a fresh var object on the composed expression.
async fn expand_struct(mi2: &Mi2Session, exp: &str) -> Result<Vec<VarInfo>, Error> {
    let _ = mi2
        .send_with_timeout(OPTION_TIMEOUT, "enable-pretty-printing", &[])
        .await;
    let record = mi2
        .send_with_timeout(
            OPTION_TIMEOUT,
            "data-evaluate-expression",
            &[exp.to_string()],
        )
        .await?
        .into_result()?;
    let value = parse_evaluated_value(&record).unwrap_or_default();

    let mut children = Vec::new();
    for key in object_keys(&value) {
        let reply = mi2
            .send_with_timeout(
                OPTION_TIMEOUT,
                "var-create",
                &[
                    key.clone(),
                    "*".to_string(),
                    format!("({}).{}", exp, key),
                ],
            )
            .await;
        match reply {
            Ok(record) => {
                if let Some(mut info) = parse_var_create(&record) {
                    info.name = key.clone();
                    children.push(info);
                }
            }
            Err(err) => {
                error!("var-create {} failed: {}", key, err);
                continue;
            }
        }
        let _ = mi2
            .send_with_timeout(OPTION_TIMEOUT, "var-delete", &[key])
            .await;
    }
    Ok(children)
}

async fn expand_array(
    mi2: &Mi2Session,
    target: &VarInfo,
    exp: &str,
    kind: ArrayKind,
) -> Result<Vec<VarInfo>, Error> {
    let length = match kind {
        ArrayKind::Fixed(length) => length,
        ArrayKind::Vector => vector_length(mi2, target, exp).await,
    };

    let mut children = Vec::new();
    for index in 0..length {
        let reply = mi2
            .send_with_timeout(
                OPTION_TIMEOUT,
                "var-create",
                &[
                    ARRAY_CHILD_VAR.to_string(),
                    "*".to_string(),
                    format!("{}[{}]", exp, index),
                ],
            )
            .await;
        match reply {
            Ok(record) => {
                if let Some(mut info) = parse_var_create(&record) {
                    info.name = index.to_string();
                    children.push(info);
                }
            }
            Err(err) => {
                error!("var-create {}[{}] failed: {}", exp, index, err);
                continue;
            }
        }
        let _ = mi2
            .send_with_timeout(OPTION_TIMEOUT, "var-delete", &[ARRAY_CHILD_VAR.to_string()])
            .await;
    }
    Ok(children)
}

/// `std::vector` length comes from `size()`; when inlining makes that call
/// unavailable, fall back to the sizeof ratio over the element type.
async fn vector_length(mi2: &Mi2Session, target: &VarInfo, exp: &str) -> usize {
    let evaluated = mi2
        .send_with_timeout(
            OPTION_TIMEOUT,
            "data-evaluate-expression",
            &[format!("{}.size()", exp)],
        )
        .await;
    if let Ok(record) = evaluated {
        if let Some(value) = parse_evaluated_value(&record) {
            if let Ok(length) = value.trim().parse::<usize>() {
                if length > 0 {
                    return length;
                }
            }
        }
    }

    let element = match first_template_param(&target.typ) {
        Some(element) => element,
        None => return 0,
    };
    let evaluated = mi2
        .send_with_timeout(
            OPTION_TIMEOUT,
            "data-evaluate-expression",
            &[format!("sizeof({})/sizeof({})", exp, element)],
        )
        .await;
    match evaluated {
        Ok(record) => parse_evaluated_value(&record)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0),
        Err(_) => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ArrayKind {
    Fixed(usize),
    Vector,
}

pub(super) fn classify_array_type(typ: &str) -> Option<ArrayKind> {
    if let Some(captures) = STD_ARRAY.captures(typ) {
        return captures[2].parse().ok().map(ArrayKind::Fixed);
    }
    if let Some(captures) = C_ARRAY.captures(typ) {
        return captures[2].parse().ok().map(ArrayKind::Fixed);
    }
    if typ.contains("std::vector") {
        return Some(ArrayKind::Vector);
    }
    None
}

/// Keys of a pretty-printed aggregate: every `\w+` directly before `=`.
fn object_keys(value: &str) -> Vec<String> {
    OBJECT_KEY
        .captures_iter(value)
        .map(|captures| captures[1].to_string())
        .filter(|key| key != "\u{0}")
        .collect()
}

/// The raw pointer type behind a smart pointer, e.g. `std::unique_ptr<Item>`
/// becomes `Item *`. None for plain types.
pub(super) fn smart_pointer_base_type(typ: &str) -> Option<String> {
    let captures = SMART_POINTER.captures(typ)?;
    Some(format!("{} *", captures[2].trim()))
}

/// Dereferenced access through a smart pointer; `weak_ptr` must be locked
/// first. Returns None for plain types.
pub(super) fn smart_pointer_deref(typ: &str, name: &str) -> Option<String> {
    let captures = SMART_POINTER.captures(typ)?;
    let base = captures[2].trim().to_string();
    let accessor = if &captures[1] == "weak_ptr" {
        format!("{}.lock().get()", name)
    } else {
        format!("{}.get()", name)
    };
    Some(format!("*({} *)({})", base, accessor))
}

fn first_template_param(typ: &str) -> Option<String> {
    FIRST_TEMPLATE_PARAM
        .captures(typ)
        .map(|captures| captures[1].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_array_length_from_type() {
        assert_eq!(
            classify_array_type("std::array<int, 5>"),
            Some(ArrayKind::Fixed(5))
        );
        assert_eq!(
            classify_array_type("std::array<Item, 12 >"),
            Some(ArrayKind::Fixed(12))
        );
    }

    #[test]
    fn c_array_length_from_type() {
        assert_eq!(classify_array_type("int [8]"), Some(ArrayKind::Fixed(8)));
        assert_eq!(classify_array_type("arr[8]"), Some(ArrayKind::Fixed(8)));
        assert_eq!(
            classify_array_type("numbers [ 3 ]"),
            Some(ArrayKind::Fixed(3))
        );
    }

    #[test]
    fn vector_is_array_like() {
        assert_eq!(
            classify_array_type("std::vector<int, std::allocator<int> >"),
            Some(ArrayKind::Vector)
        );
        assert_eq!(classify_array_type("Item"), None);
        assert_eq!(classify_array_type("struct Node *"), None);
    }

    #[test]
    fn object_key_extraction() {
        assert_eq!(
            object_keys("{id = 1, weight = 65.5, color = RED}"),
            vec!["id", "weight", "color"]
        );
        assert_eq!(object_keys("{}"), Vec::<String>::new());
        assert_eq!(
            object_keys("{node = {data = 1}, count = 2}"),
            vec!["node", "data", "count"]
        );
    }

    #[test]
    fn smart_pointer_base_type_extraction() {
        assert_eq!(
            smart_pointer_base_type("std::unique_ptr<Item>").as_deref(),
            Some("Item *")
        );
        assert_eq!(
            smart_pointer_base_type("std::shared_ptr<Item, std::allocator<Item> >").as_deref(),
            Some("Item *")
        );
        assert_eq!(
            smart_pointer_base_type("std::weak_ptr<Item>").as_deref(),
            Some("Item *")
        );
        assert_eq!(smart_pointer_base_type("Item *"), None);
        assert_eq!(smart_pointer_base_type("std::vector<Item>"), None);
    }

    #[test]
    fn smart_pointer_dereference() {
        assert_eq!(
            smart_pointer_deref("std::unique_ptr<Item>", "p").as_deref(),
            Some("*(Item *)(p.get())")
        );
        assert_eq!(
            smart_pointer_deref("std::shared_ptr<Item, deleter>", "p").as_deref(),
            Some("*(Item *)(p.get())")
        );
        assert_eq!(
            smart_pointer_deref("std::weak_ptr<Item>", "p").as_deref(),
            Some("*(Item *)(p.lock().get())")
        );
        assert_eq!(smart_pointer_deref("Item *", "p"), None);
    }

    #[test]
    fn first_template_param_extraction() {
        assert_eq!(
            first_template_param("std::vector<int, std::allocator<int> >").as_deref(),
            Some("int")
        );
        assert_eq!(
            first_template_param("std::vector<Item>").as_deref(),
            Some("Item")
        );
        assert_eq!(first_template_param("int"), None);
    }
}
