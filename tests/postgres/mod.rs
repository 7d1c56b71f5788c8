mod auth_request;
mod oidc_app;
mod policy;
mod projections;
mod unique_constraints;
mod user;
mod webauthn;
