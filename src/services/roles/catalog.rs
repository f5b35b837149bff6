/*
 * Responsibility
 * - service principal の appRoles から「ロール名 → ロール ID」の対応表を作る
 * - 応答に現れた順序を保つ (結果の並び順はこの順)
 * - 名前または ID のないロールは載せない
 */
use crate::services::graph::AppRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCatalogEntry {
    pub name: String,
    pub role_id: String,
}

/// Role name → role id mapping for the target application.
///
/// Entries keep the order in which roles appear in the service principal.
/// A name that shows up twice keeps its first position and takes the later id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleCatalog {
    entries: Vec<RoleCatalogEntry>,
}

impl RoleCatalog {
    pub fn from_app_roles<'a>(roles: impl IntoIterator<Item = &'a AppRole>) -> Self {
        let mut catalog = Self::default();
        for role in roles {
            // Roles without a value cannot be carried in tokens, and roles
            // without an id can never be assigned; skip both.
            let Some(name) = role.value.as_deref().filter(|v| !v.is_empty()) else {
                continue;
            };
            let Some(role_id) = role.id.as_deref().filter(|id| !id.is_empty()) else {
                continue;
            };
            catalog.insert(name, role_id);
        }
        catalog
    }

    fn insert(&mut self, name: &str, role_id: &str) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => existing.role_id = role_id.to_string(),
            None => self.entries.push(RoleCatalogEntry {
                name: name.to_string(),
                role_id: role_id.to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleCatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
