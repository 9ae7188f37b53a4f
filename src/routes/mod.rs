/// Router Module Index
///
/// Routes are split by access level; authentication is applied as a layer on the whole
/// `authenticated` router, so no protected endpoint can be registered without it.

/// Routes reachable without a token: health check and the token endpoints.
pub mod public;

/// Routes behind the `AuthUser` extractor. Role and country checks happen in the services.
pub mod authenticated;
