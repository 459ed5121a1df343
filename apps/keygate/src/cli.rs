use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "keygate")]
pub(crate) struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    pub(crate) host: String,
    #[arg(long, default_value_t = 8787)]
    pub(crate) port: u16,
    /// Base URL of the vendor gateway requests are forwarded to.
    #[arg(long, env = "KEYGATE_UPSTREAM_URL")]
    pub(crate) upstream_url: String,
    /// Token clients must present; leave unset to disable front auth.
    #[arg(long, env = "KEYGATE_AUTH_TOKEN")]
    pub(crate) auth_token: Option<String>,
    /// Key files checked in order; the first existing non-empty one wins.
    #[arg(long = "key-file", default_values = ["keys.local.txt", "keys.txt"])]
    pub(crate) key_files: Vec<PathBuf>,
    /// Seconds a key sits out after a rate/quota failure.
    #[arg(long, default_value_t = 86400)]
    pub(crate) cooldown_secs: u64,
    /// Seconds after which the key files are re-read on demand.
    #[arg(long, default_value_t = 300)]
    pub(crate) staleness_secs: u64,
    /// Outbound proxy for gateway calls.
    #[arg(long)]
    pub(crate) proxy: Option<String>,
}
