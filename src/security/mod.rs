pub mod permissions;

pub use permissions::PermissionService;
