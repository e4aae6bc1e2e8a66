//! Launch parameter parsing for the viewer.
//!
//! On native, parameters are parsed from command-line arguments (and their
//! environment fallbacks) using clap. On WASM, defaults are used.

use bevy::prelude::*;
use ion_tiles::DEFAULT_API_URL;

/// Access token compiled into the binary, if `ION_ACCESS_TOKEN` was set at build time.
const EMBEDDED_ION_TOKEN: &str = match option_env!("ION_ACCESS_TOKEN") {
    Some(token) => token,
    None => "",
};

/// Default size of the tileset document cache.
const DEFAULT_CACHE_MB: usize = 64;

/// Launch parameters for the viewer.
#[derive(Resource, Debug, Clone)]
pub struct LaunchParams {
    /// Bearer token for the asset hosting API.
    pub ion_token: String,
    /// Base URL of the asset hosting API.
    pub ion_api_url: String,
    /// Google Maps Platform key; the hosted proxy asset is used without one.
    pub google_maps_key: Option<String>,
    /// Initially selected month index.
    pub month: usize,
    /// Tileset document cache size in bytes.
    pub cache_bytes: usize,
}

impl Default for LaunchParams {
    fn default() -> Self {
        Self {
            ion_token: EMBEDDED_ION_TOKEN.to_string(),
            ion_api_url: DEFAULT_API_URL.to_string(),
            google_maps_key: None,
            month: 0,
            cache_bytes: DEFAULT_CACHE_MB * 1024 * 1024,
        }
    }
}

#[cfg(not(target_family = "wasm"))]
mod native {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    #[command(about = "Monthly solar radiation viewer for a building dataset")]
    pub(super) struct CliArgs {
        /// Access token for the asset hosting API.
        #[arg(long, env = "ION_ACCESS_TOKEN")]
        ion_token: Option<String>,

        /// Base URL of the asset hosting API.
        #[arg(long, default_value = DEFAULT_API_URL)]
        ion_api: String,

        /// Google Maps Platform API key for photorealistic tiles.
        #[arg(long, env = "GOOGLE_MAPS_API_KEY")]
        google_maps_key: Option<String>,

        /// Initially selected month (0 = January, 11 = December).
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=11))]
        month: u8,

        /// Tileset document cache size in megabytes.
        #[arg(long, default_value_t = DEFAULT_CACHE_MB)]
        cache_mb: usize,
    }

    impl From<CliArgs> for LaunchParams {
        fn from(args: CliArgs) -> Self {
            Self {
                ion_token: args
                    .ion_token
                    .unwrap_or_else(|| EMBEDDED_ION_TOKEN.to_string()),
                ion_api_url: args.ion_api,
                google_maps_key: args.google_maps_key.filter(|key| !key.is_empty()),
                month: usize::from(args.month),
                cache_bytes: args.cache_mb.saturating_mul(1024 * 1024),
            }
        }
    }

    pub fn parse() -> LaunchParams {
        CliArgs::parse().into()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_month_and_cache() {
            let args = CliArgs::try_parse_from([
                "solar-viewer",
                "--month",
                "5",
                "--cache-mb",
                "8",
                "--ion-token",
                "abc",
            ])
            .unwrap();
            let params = LaunchParams::from(args);
            assert_eq!(params.month, 5);
            assert_eq!(params.cache_bytes, 8 * 1024 * 1024);
            assert_eq!(params.ion_token, "abc");
        }

        #[test]
        fn test_month_out_of_range_is_rejected() {
            assert!(CliArgs::try_parse_from(["solar-viewer", "--month", "12"]).is_err());
        }

        #[test]
        fn test_huge_cache_size_saturates() {
            let huge = usize::MAX.to_string();
            let args =
                CliArgs::try_parse_from(["solar-viewer", "--cache-mb", huge.as_str()]).unwrap();
            assert_eq!(LaunchParams::from(args).cache_bytes, usize::MAX);
        }
    }
}

/// Parse launch parameters from CLI args (native) or use defaults (WASM).
pub fn parse() -> LaunchParams {
    #[cfg(not(target_family = "wasm"))]
    {
        native::parse()
    }
    #[cfg(target_family = "wasm")]
    {
        LaunchParams::default()
    }
}
