//! HTTP clients for the two outbound collaborators.

pub mod agent;
pub mod campaign;

pub use agent::HttpAgentResponder;
pub use campaign::HttpCampaignDirectory;

/// Joins a base URL and a path without doubling the slash.
fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
