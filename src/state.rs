/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - ex: roles: RoleResolver (Graph client を内包)
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 * - リクエストをまたぐ可変状態は持たない
 */
use std::sync::Arc;

use crate::services::roles::RoleResolver;

#[derive(Clone)]
pub struct AppState {
    pub roles: Arc<RoleResolver>,
}

impl AppState {
    pub fn new(roles: Arc<RoleResolver>) -> Self {
        Self { roles }
    }
}
