use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::errors::AppError;

/// Compiled-in matrix; `PERMISSION_MATRIX_PATH` overrides it at startup.
const DEFAULT_MATRIX: &str = include_str!("../../config/permission_matrix.json");

#[derive(Debug, Deserialize)]
struct MatrixFile {
    version: u32,
    roles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

/// Immutable role -> default permission set table, loaded once at startup.
/// Changing the matrix requires a restart; runtime adjustments go through the
/// override store instead.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    version: u32,
    roles: BTreeMap<String, BTreeSet<String>>,
    aliases: BTreeMap<String, String>,
    universe: BTreeSet<String>,
}

impl PermissionCatalog {
    /// Load from `PERMISSION_MATRIX_PATH` when set, otherwise the compiled-in
    /// default config.
    pub fn load() -> Result<Self, AppError> {
        match std::env::var("PERMISSION_MATRIX_PATH") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|err| {
                    AppError::configuration(format!(
                        "failed to read permission matrix at {path}: {err}"
                    ))
                })?;
                Self::from_json(&raw)
            }
            Err(_) => Self::from_json(DEFAULT_MATRIX),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let mut de = serde_json::Deserializer::from_str(raw);
        let file: MatrixFile = serde_path_to_error::deserialize(&mut de)
            .map_err(|err| AppError::configuration(format!("permission matrix: {err}")))?;

        let mut roles: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut universe = BTreeSet::new();

        for (role, permissions) in file.roles {
            let role = normalize(&role);
            let mut set = BTreeSet::new();
            for permission in permissions {
                let permission = normalize(&permission);
                if permission.is_empty() || !permission.contains('.') {
                    return Err(AppError::configuration(format!(
                        "permission matrix: role {role} grants malformed token {permission:?}"
                    )));
                }
                universe.insert(permission.clone());
                set.insert(permission);
            }
            roles.insert(role, set);
        }

        let mut aliases = BTreeMap::new();
        for (alias, target) in file.aliases {
            let alias = normalize(&alias);
            let target = normalize(&target);
            if !roles.contains_key(&target) {
                return Err(AppError::configuration(format!(
                    "permission matrix: alias {alias} points at unknown role {target}"
                )));
            }
            aliases.insert(alias, target);
        }

        Ok(Self {
            version: file.version,
            roles,
            aliases,
            universe,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Default permission set for a role; empty for roles outside the catalog.
    pub fn defaults_for(&self, role: &str) -> BTreeSet<String> {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    /// Deduplicated union of every grantable permission, lexicographic order.
    pub fn all_permissions(&self) -> &BTreeSet<String> {
        &self.universe
    }

    /// Resolve a raw (possibly historical) role string to its current
    /// identifier. Unmapped values pass through normalized, so callers can
    /// still detect them with [`is_known`](Self::is_known).
    pub fn canonical_role(&self, raw: &str) -> String {
        let normalized = normalize(raw);
        match self.aliases.get(&normalized) {
            Some(target) => target.clone(),
            None => normalized,
        }
    }

    pub fn is_known(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Catalog roles in stable (lexicographic) order.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
