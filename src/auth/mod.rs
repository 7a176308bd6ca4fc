pub mod oauth;
pub mod pkce;
