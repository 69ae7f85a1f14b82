use std::{env, time::Duration};

use log::*;
use settlement_engine::{RefundMode, SettlementConfig};
use shopify_tools::ShopifyConfig as ShopifyApiConfig;
use ssg_common::{parse_boolean_flag, Secret};

const DEFAULT_SSG_HOST: &str = "127.0.0.1";
const DEFAULT_SSG_PORT: u16 = 8360;
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_GATEWAY_KEYWORD: &str = "settlement-gateway";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Public base URL of this gateway, used to build checkout and payout-claim links.
    pub public_base_url: String,
    pub shopify: ShopifyGatewayConfig,
    pub refund: RefundConfig,
    /// Upper bound on waiting for a per-order lock on request-driven paths.
    pub lock_timeout: Duration,
    /// Optional sink that receives refund-settled notifications (claim link + recipient). When unset, settled
    /// refunds are only logged.
    pub refund_notify_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ShopifyGatewayConfig {
    pub api: ShopifyApiConfig,
    /// Secret used to sign webhook payloads. Distinct from the app shared secret.
    pub webhook_secret: Secret<String>,
    /// If false, webhook HMAC checks are skipped and every payload is accepted. Development only.
    pub hmac_checks: bool,
    /// Only orders paid through a gateway whose name contains this keyword belong to us.
    pub gateway_keyword: String,
}

impl Default for ShopifyGatewayConfig {
    fn default() -> Self {
        Self {
            api: ShopifyApiConfig::default(),
            webhook_secret: Secret::default(),
            hmac_checks: true,
            gateway_keyword: DEFAULT_GATEWAY_KEYWORD.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RefundConfig {
    pub mode: RefundMode,
    /// Spread in basis points, validated to `0..10_000`.
    pub spread_bps: i64,
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self { mode: RefundMode::RateAtPaymentTime, spread_bps: 0 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SSG_HOST.to_string(),
            port: DEFAULT_SSG_PORT,
            database_url: String::default(),
            public_base_url: format!("http://{DEFAULT_SSG_HOST}:{DEFAULT_SSG_PORT}"),
            shopify: ShopifyGatewayConfig::default(),
            refund: RefundConfig::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            refund_notify_url: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SSG_HOST").ok().unwrap_or_else(|| DEFAULT_SSG_HOST.into());
        let port = env::var("SSG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SSG_PORT. {e} Using the default, {DEFAULT_SSG_PORT}, \
                         instead."
                    );
                    DEFAULT_SSG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SSG_PORT);
        let database_url = env::var("SSG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SSG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let public_base_url =
            env::var("SSG_PUBLIC_BASE_URL").ok().unwrap_or_else(|| format!("http://{host}:{port}"));
        let public_base_url = public_base_url.trim_end_matches('/').to_string();
        let shopify = ShopifyGatewayConfig::from_env_or_defaults();
        let refund = RefundConfig::from_env_or_defaults();
        let lock_timeout = env::var("SSG_LOCK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for SSG_LOCK_TIMEOUT_SECS. {e}"))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LOCK_TIMEOUT);
        let refund_notify_url = env::var("SSG_REFUND_NOTIFY_URL").ok().filter(|s| !s.trim().is_empty());
        Self { host, port, database_url, public_base_url, shopify, refund, lock_timeout, refund_notify_url }
    }

    /// The engine-facing slice of this configuration.
    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            gateway_keyword: self.shopify.gateway_keyword.clone(),
            refund_mode: self.refund.mode,
            refund_spread_bps: self.refund.spread_bps,
            lock_timeout: self.lock_timeout,
            public_base_url: self.public_base_url.clone(),
        }
    }
}

impl ShopifyGatewayConfig {
    pub fn from_env_or_defaults() -> Self {
        let api = ShopifyApiConfig::new_from_env_or_default();
        let webhook_secret = Secret::new(env::var("SSG_SHOPIFY_WEBHOOK_SECRET").unwrap_or_else(|_| {
            error!(
                "🪛️ SSG_SHOPIFY_WEBHOOK_SECRET is not set. Webhook signatures cannot be verified without it, so \
                 every webhook delivery will be rejected."
            );
            String::default()
        }));
        let hmac_checks = parse_boolean_flag(env::var("SSG_SHOPIFY_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook HMAC checks are DISABLED. Do not run a production instance like this.");
        }
        let gateway_keyword = env::var("SSG_GATEWAY_KEYWORD").ok().unwrap_or_else(|| {
            warn!("🪛️ SSG_GATEWAY_KEYWORD not set, using '{DEFAULT_GATEWAY_KEYWORD}' as default");
            DEFAULT_GATEWAY_KEYWORD.to_string()
        });
        Self { api, webhook_secret, hmac_checks, gateway_keyword }
    }
}

impl RefundConfig {
    pub fn from_env_or_defaults() -> Self {
        let mode = env::var("SSG_REFUND_MODE")
            .ok()
            .and_then(|s| {
                s.parse::<RefundMode>()
                    .map_err(|e| warn!("🪛️ Ignoring SSG_REFUND_MODE: {e}"))
                    .ok()
            })
            .unwrap_or(RefundMode::RateAtPaymentTime);
        let spread_bps = env::var("SSG_REFUND_SPREAD")
            .ok()
            .and_then(|s| {
                s.parse::<f64>().map_err(|e| warn!("🪛️ Invalid value for SSG_REFUND_SPREAD: {e}")).ok()
            })
            .map(|percent| (percent * 100.0).round() as i64)
            .unwrap_or(0);
        // upper bound is exclusive: a 100% spread would silently zero every payout
        let spread_bps = if !(0..10_000).contains(&spread_bps) {
            error!(
                "🪛️ SSG_REFUND_SPREAD must be at least 0 and less than 100 percent. Ignoring the configured value \
                 and using 0."
            );
            0
        } else {
            spread_bps
        };
        Self { mode, spread_bps }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_SSG_PORT);
        assert_eq!(config.refund.spread_bps, 0);
        assert_eq!(config.settlement_config().gateway_keyword, DEFAULT_GATEWAY_KEYWORD);
        assert!(config.shopify.hmac_checks);
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);
    }
}
