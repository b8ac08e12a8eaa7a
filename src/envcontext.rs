// Scoped environment patching for child processes.
//
// Patches are applied to a `ProcessEnvironment` value that child processes are
// spawned from, never to the environment of the running process.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Platform separator used when prepending to list-like variables
#[cfg(windows)]
pub const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
pub const PATH_SEPARATOR: &str = ":";

/// One piece of a patched value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuePart {
    Literal(String),
    /// Reference to the value the variable had before the patch was applied
    Var { name: String, default: String },
}

/// Operation applied to a single variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchValue {
    Set(Vec<ValuePart>),
    /// Prepend to the prior value, joined with the platform path separator
    Prepend(String),
    Unset,
}

/// Ordered set of variable operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvPatch {
    entries: Vec<(String, PatchValue)>,
}

impl EnvPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((
            name.into(),
            PatchValue::Set(vec![ValuePart::Literal(value.into())]),
        ));
        self
    }

    pub fn set_parts(mut self, name: impl Into<String>, parts: Vec<ValuePart>) -> Self {
        self.entries.push((name.into(), PatchValue::Set(parts)));
        self
    }

    pub fn prepend_path(mut self, name: impl Into<String>, dir: &Path) -> Self {
        self.entries.push((
            name.into(),
            PatchValue::Prepend(dir.to_string_lossy().into_owned()),
        ));
        self
    }

    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), PatchValue::Unset));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, PatchValue)> {
        self.entries.iter()
    }
}

/// Snapshot of environment variables that child processes inherit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnvironment {
    vars: BTreeMap<String, String>,
}

impl ProcessEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the environment of the running process
    pub fn inherit_system() -> Self {
        Self::from_vars(std::env::vars_os().filter_map(|(k, v)| {
            Some((k.into_string().ok()?, v.into_string().ok()?))
        }))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set_var(&mut self, key: &str, value: &str) -> &mut Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Directories of the `PATH` variable, in search order
    pub fn path_dirs(&self) -> Vec<PathBuf> {
        self.get("PATH")
            .map(|path| std::env::split_paths(&OsString::from(path)).collect())
            .unwrap_or_default()
    }

    /// Apply `patch` until the returned guard is dropped.
    ///
    /// Guards nest: a guard derefs to the environment, so a second patch can be
    /// activated on top of it and is undone first.
    pub fn activate(&mut self, patch: &EnvPatch) -> EnvGuard<'_> {
        let mut saved = Vec::with_capacity(patch.len());

        for (name, value) in patch.iter() {
            let prior = self.vars.get(name).cloned();
            match value {
                PatchValue::Unset => {
                    self.vars.remove(name);
                }
                PatchValue::Set(parts) => {
                    let resolved = self.resolve_parts(parts);
                    self.vars.insert(name.clone(), resolved);
                }
                PatchValue::Prepend(head) => {
                    let joined = match prior.as_deref() {
                        Some(rest) if !rest.is_empty() => {
                            format!("{head}{PATH_SEPARATOR}{rest}")
                        }
                        _ => head.clone(),
                    };
                    self.vars.insert(name.clone(), joined);
                }
            }
            saved.push((name.clone(), prior));
        }

        EnvGuard { env: self, saved }
    }

    fn resolve_parts(&self, parts: &[ValuePart]) -> String {
        parts
            .iter()
            .map(|part| match part {
                ValuePart::Literal(s) => s.clone(),
                ValuePart::Var { name, default } => self
                    .vars
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| default.clone()),
            })
            .collect()
    }
}

/// Restores the variables touched by a patch when dropped
#[derive(Debug)]
pub struct EnvGuard<'a> {
    env: &'a mut ProcessEnvironment,
    saved: Vec<(String, Option<String>)>,
}

impl Deref for EnvGuard<'_> {
    type Target = ProcessEnvironment;

    fn deref(&self) -> &Self::Target {
        self.env
    }
}

impl DerefMut for EnvGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.env
    }
}

impl Drop for EnvGuard<'_> {
    fn drop(&mut self) {
        // Reverse order so a variable patched twice ends at its original value
        for (name, prior) in self.saved.drain(..).rev() {
            match prior {
                Some(value) => {
                    self.env.vars.insert(name, value);
                }
                None => {
                    self.env.vars.remove(&name);
                }
            }
        }
    }
}
