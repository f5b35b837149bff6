/*
 * Responsibility
 * - middleware の公開インターフェース
 * - app.rs からは cors::apply / http::apply / security_headers::apply を呼ぶだけ
 */
pub mod cors;
pub mod http;
pub mod security_headers;
