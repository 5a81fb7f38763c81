/// Authentication and authorization
///
/// - [`password`]: Argon2id hashing and strength rules
/// - [`jwt`]: HS256 access tokens with a fixed validity window
/// - [`middleware`]: bearer header to [`middleware::AuthContext`]
/// - [`authorization`]: family owner / member checks

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
