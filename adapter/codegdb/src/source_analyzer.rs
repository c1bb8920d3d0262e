use crate::prelude::*;

use crate::Language;
use tree_sitter::{Node, Parser};

/// One local variable declaration inside a function.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub line: i64,
}

/// A function with the locals (parameters included) declared in it.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub line: i64,
    pub variables: Vec<VariableDecl>,
}

/// Function-local variable names extracted from the source text.
///
/// Listing locals straight from GDB reports variables that are in scope but
/// not yet initialized at the stop line; filtering by declaration line
/// suppresses those. This index is built once at session start and consulted
/// for every local-scope request.
pub struct SourceIndex {
    functions: Vec<FunctionInfo>,
}

impl SourceIndex {
    pub fn parse(source: &str, language: Language) -> Result<SourceIndex, Error> {
        let mut parser = Parser::new();
        let result = match language {
            Language::C => parser.set_language(&tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => parser.set_language(&tree_sitter_cpp::LANGUAGE.into()),
        };
        result.map_err(str_error)?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| str_error("source parse failed"))?;

        let mut functions = Vec::new();
        collect_functions(tree.root_node(), source.as_bytes(), &mut functions);
        Ok(SourceIndex { functions })
    }

    /// Names of the locals declared before `stop_line` in `function`, in
    /// declaration order. None when the function is not in the index, in
    /// which case the caller falls back to asking GDB.
    pub fn visible_locals(&self, function: &str, stop_line: i64) -> Option<Vec<String>> {
        let info = self.functions.iter().find(|f| f.name == function)?;
        Some(
            info.variables
                .iter()
                .filter(|v| v.line < stop_line)
                .map(|v| v.name.clone())
                .collect(),
        )
    }

    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }
}

fn collect_functions(node: Node, source: &[u8], functions: &mut Vec<FunctionInfo>) {
    if node.kind() == "function_definition" {
        if let Some(info) = function_info(node, source) {
            functions.push(info);
        }
        // Nested function definitions (lambdas aside) are not a thing in
        // the supported languages; no need to descend further.
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_functions(child, source, functions);
        }
    }
}

fn function_info(node: Node, source: &[u8]) -> Option<FunctionInfo> {
    let declarator = node.child_by_field_name("declarator")?;
    let name_node = first_identifier(declarator)?;
    let name = node_text(name_node, source);

    let mut variables = Vec::new();
    let mut seen = Vec::new();

    if let Some(parameters) = declarator.child_by_field_name("parameters") {
        for i in 0..parameters.named_child_count() {
            let parameter = match parameters.named_child(i) {
                Some(p) if p.kind() == "parameter_declaration" => p,
                _ => continue,
            };
            if let Some(decl) = parameter.child_by_field_name("declarator") {
                push_declared(decl, source, &mut variables, &mut seen);
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        collect_declarations(body, source, &mut variables, &mut seen);
    }

    Some(FunctionInfo {
        name,
        line: name_node.start_position().row as i64 + 1,
        variables,
    })
}

fn collect_declarations(
    node: Node,
    source: &[u8],
    variables: &mut Vec<VariableDecl>,
    seen: &mut Vec<String>,
) {
    if node.kind() == "declaration" {
        // `int a = 1, b, *c;` has one declarator field per introduced name.
        for i in 0..node.child_count() {
            if node.field_name_for_child(i as u32) != Some("declarator") {
                continue;
            }
            if let Some(decl) = node.child(i) {
                let target = decl
                    .child_by_field_name("declarator")
                    .filter(|_| decl.kind() == "init_declarator")
                    .unwrap_or(decl);
                push_declared(target, source, variables, seen);
            }
        }
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_declarations(child, source, variables, seen);
        }
    }
}

fn push_declared(
    declarator: Node,
    source: &[u8],
    variables: &mut Vec<VariableDecl>,
    seen: &mut Vec<String>,
) {
    if let Some(identifier) = first_identifier(declarator) {
        let name = node_text(identifier, source);
        if name.is_empty() || seen.contains(&name) {
            return;
        }
        variables.push(VariableDecl {
            name: name.clone(),
            line: identifier.start_position().row as i64 + 1,
        });
        seen.push(name);
    }
}

// Depth-first search for the declared identifier; declarators nest
// arbitrarily through pointer/array/reference/function layers.
fn first_identifier(node: Node) -> Option<Node> {
    if node.kind() == "identifier" {
        return Some(node);
    }
    for i in 0..node.child_count() {
        if let Some(found) = node.child(i).and_then(first_identifier) {
            return Some(found);
        }
    }
    None
}

fn node_text(node: Node, source: &[u8]) -> String {
    String::from_utf8_lossy(&source[node.start_byte()..node.end_byte()]).into_owned()
}
