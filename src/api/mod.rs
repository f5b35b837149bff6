/*
 * Responsibility
 * - API バージョンの束ね (v1 の routes() と handler を公開)
 */
pub mod v1;
