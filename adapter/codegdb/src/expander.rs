mod c;
mod cpp;

use crate::prelude::*;

use crate::handles::{self, HandleMap, RefKind, VarRef};
use crate::mi2_output::{
    self, is_address, is_null_pointer, is_startup_address, to_address, VarInfo,
};
use crate::mi2_session::{Mi2Session, OPTION_TIMEOUT};
use crate::source_analyzer::SourceIndex;
use adapter_protocol::Variable;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

/// Name of the var object created while answering one request; deleted
/// again before the reply goes out.
const STRUCT_VAR: &str = "structName";

/// Only symbols from the user's own translation unit are listed as globals.
const MAIN_SUFFIXES: [&str; 3] = ["main.c", "main.cpp", "main"];

lazy_static! {
    static ref C_ARRAY_TYPE: Regex = Regex::new(r"\w+\s*\[\d*\]").unwrap();
}

/// Language-specific child listing, chosen once at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    C,
    Cpp,
}

/// Where a child variable was found; decides which descriptor its handle
/// gets.
enum Origin<'a> {
    Scope { frame_id: i64 },
    Nested { parent: &'a VarRef },
}

/// Expands a variables reference into child variables by driving GDB's
/// varobj machinery, then classifying every child per the pointer/struct
/// rules shared by all entry points.
pub struct VariableExpander {
    mi2: Arc<Mi2Session>,
    refs: Arc<HandleMap>,
    expansion: Expansion,
    oracle: Option<SourceIndex>,
}

impl VariableExpander {
    pub fn new(
        mi2: Arc<Mi2Session>,
        refs: Arc<HandleMap>,
        expansion: Expansion,
        oracle: Option<SourceIndex>,
    ) -> VariableExpander {
        VariableExpander {
            mi2,
            refs,
            expansion,
            oracle,
        }
    }

    pub async fn variables(&self, reference: i64) -> Result<Vec<Variable>, Error> {
        if handles::is_global_scope(reference) {
            self.global_variables().await
        } else if handles::is_local_scope(reference) {
            self.local_variables(reference).await
        } else {
            self.expand_reference(reference).await
        }
    }

    async fn global_variables(&self) -> Result<Vec<Variable>, Error> {
        let record = self
            .mi2
            .send_with_timeout(
                OPTION_TIMEOUT,
                "symbol-info-variables",
                &["--max-results".to_string(), "40".to_string()],
            )
            .await?;
        let names = mi2_output::parse_global_variable_names(&record, &MAIN_SUFFIXES);

        let mut variables = Vec::new();
        for name in names {
            if let Some(info) = self.transient_var(&name).await {
                if let Some(variable) = self.classify(info, Origin::Scope { frame_id: 0 }).await {
                    variables.push(variable);
                }
            }
        }
        Ok(variables)
    }

    async fn local_variables(&self, reference: i64) -> Result<Vec<Variable>, Error> {
        let frame_id = handles::frame_from_local_reference(reference);
        let names = match self.oracle_names(frame_id).await {
            Some(names) => names,
            None => self.gdb_local_names(frame_id).await?,
        };

        let mut variables = Vec::new();
        for name in names {
            if let Some(info) = self.transient_var(&name).await {
                if let Some(variable) = self.classify(info, Origin::Scope { frame_id }).await {
                    variables.push(variable);
                }
            }
        }
        Ok(variables)
    }

    async fn expand_reference(&self, reference: i64) -> Result<Vec<Variable>, Error> {
        let descriptor = self.refs.parse(reference)?;

        // Variable names are not frame-unique; a frame-rooted descriptor
        // must pin its frame first. Addressed descriptors need no frame.
        if descriptor.kind == RefKind::Variable {
            if let Some(frame_id) = &descriptor.frame_id {
                self.mi2
                    .send_with_timeout(OPTION_TIMEOUT, "stack-select-frame", &[frame_id.clone()])
                    .await?;
            }
        }

        let _ = self
            .mi2
            .send_with_timeout(OPTION_TIMEOUT, "enable-pretty-printing", &[])
            .await;

        let exp = export_expression(&descriptor, self.expansion);
        let reply = self
            .mi2
            .send_with_timeout(
                OPTION_TIMEOUT,
                "var-create",
                &[STRUCT_VAR.to_string(), "*".to_string(), exp.clone()],
            )
            .await?
            .into_result()?;
        let target = mi2_output::parse_var_create(&reply)
            .ok_or_else(|| str_error(format!("cannot inspect {}", exp)))?;

        let children = match self.expansion {
            Expansion::C => c::list_children(&self.mi2).await,
            Expansion::Cpp => cpp::list_children(&self.mi2, &target, &exp).await,
        };
        // The var object must not survive this request, or the next
        // var-create with the same name fails. Deleting a name that was
        // never created is tolerated by design.
        let _ = self
            .mi2
            .send_with_timeout(OPTION_TIMEOUT, "var-delete", &[STRUCT_VAR.to_string()])
            .await;
        let children = children?;

        let mut variables = Vec::new();
        for child in children {
            if let Some(variable) = self
                .classify(child, Origin::Nested { parent: &descriptor })
                .await
            {
                variables.push(variable);
            }
        }
        Ok(variables)
    }

    /// var-create / var-delete round trip to recover type, value and child
    /// count for one named variable in the selected frame.
    async fn transient_var(&self, name: &str) -> Option<VarInfo> {
        let reply = self
            .mi2
            .send_with_timeout(
                OPTION_TIMEOUT,
                "var-create",
                &[name.to_string(), "*".to_string(), name.to_string()],
            )
            .await;
        let info = match reply {
            Ok(record) => mi2_output::parse_var_create(&record),
            Err(err) => {
                error!("var-create {} failed: {}", name, err);
                None
            }
        };
        let _ = self
            .mi2
            .send_with_timeout(OPTION_TIMEOUT, "var-delete", &[name.to_string()])
            .await;
        // The var object carries its own name; report the variable's.
        info.map(|mut info| {
            info.name = name.to_string();
            info
        })
    }

    /// The shared per-child rules: compound values get a frame-rooted or
    /// field-extended descriptor, addresses get a pointer descriptor unless
    /// they are null, start-up artifacts, or `char *` text.
    async fn classify(&self, info: VarInfo, origin: Origin<'_>) -> Option<Variable> {
        let value = info.value.clone().unwrap_or_default();
        let value_is_address = is_address(&value);

        let mut variable = Variable {
            name: info.name.clone(),
            value,
            type_: Some(info.typ.clone()),
            variables_reference: 0,
            indexed_variables: if info.numchild > 0 {
                Some(info.numchild)
            } else {
                None
            },
        };

        if !value_is_address && info.numchild != 0 {
            let descriptor = match &origin {
                Origin::Scope { frame_id } => {
                    VarRef::frame_variable(*frame_id, &info.name, &info.typ)
                }
                Origin::Nested { parent } => parent.field(&info.name),
            };
            variable.variables_reference = self.refs.create(&descriptor);
            variable.value = String::new();
        }

        if value_is_address && info.numchild != 0 && info.typ != "char *" {
            if is_startup_address(&variable.value) {
                return None;
            }
            let address = to_address(&variable.value);
            variable.value = address.clone();
            if !is_null_pointer(&address) {
                // A smart pointer below the root has no standalone name to
                // call .get() on; its printed address is already the pointee,
                // so the descriptor addresses it through the raw pointer
                // type. Scope-rooted smart pointers keep their name and
                // compose the accessor in export_expression.
                let descriptor = match &origin {
                    Origin::Scope { .. } => VarRef::pointer(&info.name, &info.typ, &address),
                    Origin::Nested { .. } => {
                        let typ = cpp::smart_pointer_base_type(&info.typ)
                            .unwrap_or_else(|| info.typ.clone());
                        VarRef::pointer(&info.name, &typ, &address)
                    }
                };
                variable.variables_reference = self.refs.create(&descriptor);
            }
        }

        // Arrays visualize by their base address; `&name` only resolves for
        // scope-rooted names.
        if matches!(origin, Origin::Scope { .. }) && C_ARRAY_TYPE.is_match(&info.typ) {
            if let Some(address) = self.evaluate_value(&format!("&{}", info.name)).await {
                variable.value = address;
            }
        }

        Some(variable)
    }

    async fn evaluate_value(&self, expression: &str) -> Option<String> {
        let record = self
            .mi2
            .send_with_timeout(
                OPTION_TIMEOUT,
                "data-evaluate-expression",
                &[expression.to_string()],
            )
            .await
            .ok()?;
        mi2_output::parse_evaluated_value(&record)
    }

    async fn oracle_names(&self, frame_id: i64) -> Option<Vec<String>> {
        let oracle = self.oracle.as_ref()?;

        let record = self
            .mi2
            .send_with_timeout(OPTION_TIMEOUT, "stack-list-frames", &[])
            .await
            .ok()?;
        let frames = mi2_output::parse_stack_trace(&record);
        let frame = frames.iter().find(|f| f.id == frame_id)?;

        oracle.visible_locals(&frame.name, frame.line)
    }

    async fn gdb_local_names(&self, frame_id: i64) -> Result<Vec<String>, Error> {
        let thread_record = self
            .mi2
            .send_with_timeout(OPTION_TIMEOUT, "thread-info", &[])
            .await?;
        let thread_id = mi2_output::parse_current_thread(&thread_record)
            .ok_or_else(|| str_error("no current thread"))?;

        let record = self
            .mi2
            .send_with_timeout(
                OPTION_TIMEOUT,
                "stack-list-variables",
                &[
                    "--thread".to_string(),
                    thread_id,
                    "--frame".to_string(),
                    frame_id.to_string(),
                    "--skip-unavailable".to_string(),
                    "2".to_string(),
                ],
            )
            .await?;
        Ok(mi2_output::parse_frame_variable_names(&record))
    }
}

/// The native expression a descriptor stands for.
///
/// C: `name` / `(type)address`, field access composed as `(exp)<fieldPath>`.
/// C++ dereferences addressed descriptors (`*(type)address`) and reaches
/// through smart pointers via their raw-pointer accessors.
pub fn export_expression(descriptor: &VarRef, expansion: Expansion) -> String {
    let name = descriptor.variable_name.as_deref().unwrap_or_default();
    let address = descriptor.address.as_deref().unwrap_or_default();

    let mut exp = match descriptor.kind {
        RefKind::Variable => name.to_string(),
        RefKind::Pointer => match expansion {
            Expansion::C => format!("({}){}", descriptor.variable_type, address),
            Expansion::Cpp => match cpp::smart_pointer_deref(&descriptor.variable_type, name) {
                Some(deref) => deref,
                None => format!("*({}){}", descriptor.variable_type, address),
            },
        },
    };
    if !descriptor.field_path.is_empty() {
        exp = format!("({}){}", exp, descriptor.field_path);
    }
    exp
}
