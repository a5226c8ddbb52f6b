pub mod permissions;
pub mod principal;
pub mod tokens;

pub use permissions::PermissionTable;
pub use principal::Principal;
pub use tokens::TokenStore;
