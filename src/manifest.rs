//! Test manifest loading.
//!
//! A manifest is a JSON document with three keys: `stl_files` (relative
//! paths to the program sources), `roles` (one instantiation per role the
//! run needs, each naming a fully-qualified `module::role` plus a value per
//! declared field), and `test` (the fully-qualified roles to drive, each of
//! which must appear under `roles`).
//!
//! Before parsing, every `$key` occurrence in the manifest text is literally
//! replaced from a `key=value` argument list. Substitution is textual and
//! non-recursive: a substituted value is never re-scanned.
//!
//! ```json
//! {
//!   "stl_files": ["tls.stl"],
//!   "roles": [
//!     { "role": "tls::rSender", "ipAddress": "$ip", "port": 4433 }
//!   ],
//!   "test": ["tls::rSender"]
//! }
//! ```

use crate::error::ManifestError;
use crate::program::{Program, Type};
use crate::value::{RoleInstance, Value};
use std::path::{Path, PathBuf};

/// A resolved manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Program sources, resolved against the manifest's directory
    pub stl_files: Vec<PathBuf>,
    /// Role instantiations
    pub roles: Vec<RoleEntry>,
    /// Fully-qualified names of the roles to drive
    pub test: Vec<String>,
}

/// One role instantiation from the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleEntry {
    /// Fully-qualified role name
    pub role: String,
    /// Field values as they appeared in the document
    pub fields: Vec<(String, serde_json::Value)>,
}

/// Parses `key=value` manifest arguments.
pub fn parse_args<S: AsRef<str>>(raw: &[S]) -> Result<Vec<(String, String)>, ManifestError> {
    raw.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            arg.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| ManifestError::MalformedArg {
                    arg: arg.to_string(),
                })
        })
        .collect()
}

/// Replaces every `$key` occurrence with its argument value.
///
/// Substitution is textual and non-recursive. A `$` not followed by an
/// identifier is kept as-is; a `$key` with no matching argument is an error.
pub fn substitute(text: &str, args: &[(String, String)]) -> Result<String, ManifestError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];
        let key_len = rest
            .find(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
            .unwrap_or(rest.len());
        if key_len == 0 {
            out.push('$');
            continue;
        }
        let key = &rest[..key_len];
        match args.iter().find(|(k, _)| k == key) {
            Some((_, value)) => out.push_str(value),
            None => {
                return Err(ManifestError::UnknownSubstitution {
                    key: key.to_string(),
                })
            }
        }
        rest = &rest[key_len..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Loads a manifest file, applying `$key` substitution first.
///
/// Relative `stl_files` paths resolve against the manifest's directory.
pub fn load(path: &Path, args: &[(String, String)]) -> Result<Manifest, ManifestError> {
    let text = std::fs::read_to_string(path)?;
    let substituted = substitute(&text, args)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    read_str(&substituted, base)
}

/// Parses manifest text that has already been substituted.
pub fn read_str(text: &str, base_dir: &Path) -> Result<Manifest, ManifestError> {
    let document: serde_json::Value = serde_json::from_str(text)?;
    let object = document
        .as_object()
        .ok_or_else(|| bad_key("manifest", "expected a JSON object"))?;

    let stl_files = object
        .get("stl_files")
        .and_then(|v| v.as_array())
        .ok_or_else(|| bad_key("stl_files", "expected a list of paths"))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(|path| base_dir.join(path))
                .ok_or_else(|| bad_key("stl_files", "entries must be strings"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let roles = object
        .get("roles")
        .and_then(|v| v.as_array())
        .ok_or_else(|| bad_key("roles", "expected a list of role entries"))?
        .iter()
        .map(read_role_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let test = object
        .get("test")
        .and_then(|v| v.as_array())
        .ok_or_else(|| bad_key("test", "expected a list of role names"))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| bad_key("test", "entries must be strings"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Every driven role must be instantiated
    for role in &test {
        if !roles.iter().any(|entry| &entry.role == role) {
            return Err(ManifestError::UndrivenRole { role: role.clone() });
        }
    }

    Ok(Manifest {
        stl_files,
        roles,
        test,
    })
}

fn read_role_entry(json: &serde_json::Value) -> Result<RoleEntry, ManifestError> {
    let object = json
        .as_object()
        .ok_or_else(|| bad_key("roles", "each entry must be an object"))?;
    let role = object
        .get("role")
        .and_then(|v| v.as_str())
        .ok_or_else(|| bad_key("roles", "each entry needs a 'role' name"))?
        .to_string();
    let fields = object
        .iter()
        .filter(|(key, _)| key.as_str() != "role")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(RoleEntry { role, fields })
}

fn bad_key(key: &str, reason: &str) -> ManifestError {
    ManifestError::BadKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

impl Manifest {
    /// Builds role instances, validating every entry against the program.
    ///
    /// Each entry must name a declared role and supply a value of the right
    /// type for every declared field; undeclared fields are rejected.
    /// Instance fields come out in declaration order.
    pub fn role_instances(&self, program: &Program) -> Result<Vec<RoleInstance>, ManifestError> {
        self.roles
            .iter()
            .map(|entry| {
                let decl = program.role(&entry.role).ok_or_else(|| {
                    ManifestError::UnknownRole {
                        role: entry.role.clone(),
                    }
                })?;
                for (field, _) in &entry.fields {
                    if !decl.fields.iter().any(|(name, _)| name == field) {
                        return Err(ManifestError::BadRoleField {
                            role: entry.role.clone(),
                            field: field.clone(),
                            reason: "not declared on the role".to_string(),
                        });
                    }
                }
                let fields = decl
                    .fields
                    .iter()
                    .map(|(name, ty)| {
                        let json = entry
                            .fields
                            .iter()
                            .find(|(field, _)| field == name)
                            .map(|(_, value)| value)
                            .ok_or_else(|| ManifestError::BadRoleField {
                                role: entry.role.clone(),
                                field: name.clone(),
                                reason: "missing".to_string(),
                            })?;
                        let value = json_to_value(json, ty).ok_or_else(|| {
                            ManifestError::BadRoleField {
                                role: entry.role.clone(),
                                field: name.clone(),
                                reason: format!("expected {}", ty),
                            }
                        })?;
                        Ok((name.clone(), value))
                    })
                    .collect::<Result<Vec<_>, ManifestError>>()?;
                Ok(RoleInstance {
                    role: entry.role.clone(),
                    fields,
                })
            })
            .collect()
    }
}

fn json_to_value(json: &serde_json::Value, ty: &Type) -> Option<Value> {
    match ty {
        Type::Int => json.as_i64().map(Value::Int),
        Type::Bool => json.as_bool().map(Value::Bool),
        Type::Str => json.as_str().map(|s| Value::Str(s.to_string())),
        Type::Message(_) => None,
    }
}
