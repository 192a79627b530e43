/// Router Module Index
///
/// Routes are split by access level; authentication is applied as a layer on
/// the whole authenticated router rather than per handler.

/// Routes open to anonymous clients: tab gates, sign-up and password reset.
pub mod public;

/// Routes behind the `AuthUser` extractor middleware.
pub mod authenticated;
