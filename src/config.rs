// config.rs
use std::env;

use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Payment gateway
    pub payment_environment: String,
    pub gateway_merchant_id: String,
    pub gateway_secret_key: String,
    pub gateway_callback_salt: String,
    pub gateway_callback_url: String,

    // Business
    pub commission_rate: Decimal,
    pub default_currency: String,
    pub bank_beneficiary: String,
    pub bank_iban: String,
    pub pricing_config_path: Option<String>,

    // Notifications
    pub sms_api_key: String,
    pub sms_username: String,
    pub sms_from: String,

    // Infra
    pub database_url: String,
    pub database_name: String,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let payment_environment =
            env::var("PAYMENT_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string());
        let is_production = payment_environment == "production";

        // Real gateway credentials are only mandatory in production; the
        // sandbox provider signs with whatever is configured.
        let gateway_secret_key = if is_production {
            env::var("GATEWAY_SECRET_KEY").expect("GATEWAY_SECRET_KEY must be set")
        } else {
            env::var("GATEWAY_SECRET_KEY").unwrap_or_else(|_| "sandbox-secret".to_string())
        };
        let gateway_callback_salt = if is_production {
            env::var("GATEWAY_CALLBACK_SALT").expect("GATEWAY_CALLBACK_SALT must be set")
        } else {
            env::var("GATEWAY_CALLBACK_SALT").unwrap_or_else(|_| "sandbox-salt".to_string())
        };

        let commission_rate = env::var("COMMISSION_RATE")
            .unwrap_or_else(|_| "0.25".to_string())
            .parse::<Decimal>()
            .expect("COMMISSION_RATE must be a decimal in [0, 1]");

        AppConfig {
            payment_environment,
            gateway_merchant_id: env::var("GATEWAY_MERCHANT_ID")
                .unwrap_or_else(|_| "TEST-MERCHANT".to_string()),
            gateway_secret_key,
            gateway_callback_salt,
            gateway_callback_url: env::var("GATEWAY_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:10000/api/payments/callback".to_string()),
            commission_rate,
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "EUR".to_string()),
            bank_beneficiary: env::var("BANK_BENEFICIARY")
                .unwrap_or_else(|_| "AeroRide Transfers Ltd.".to_string()),
            bank_iban: env::var("BANK_IBAN")
                .unwrap_or_else(|_| "HU42 1177 3016 1111 1018 0000 0000".to_string()),
            pricing_config_path: env::var("PRICING_CONFIG").ok(),
            sms_api_key: env::var("SMS_API_KEY").unwrap_or_default(),
            sms_username: env::var("SMS_USERNAME").unwrap_or_else(|_| "sandbox".to_string()),
            sms_from: env::var("SMS_FROM").unwrap_or_else(|_| "AeroRide".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "transferdb".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .expect("PORT must be a number"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.payment_environment == "production"
    }

    /// (checkout_url, refund_url) for the card gateway.
    pub fn get_gateway_urls(&self) -> (String, String) {
        let base_url = if self.is_production() {
            env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.cardgate.example.com".to_string())
        } else {
            env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.cardgate.example.com".to_string())
        };

        let checkout_url = format!("{}/v1/payment/start", base_url);
        let refund_url = format!("{}/v1/payment/refund", base_url);

        (checkout_url, refund_url)
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "environment": self.payment_environment,
            "is_production": self.is_production(),
            "merchant_id": self.gateway_merchant_id,
            "callback_url": self.gateway_callback_url,
            "secret_key_set": !self.gateway_secret_key.is_empty(),
            "commission_rate": self.commission_rate.to_string(),
            "currency": self.default_currency,
            "port": self.port,
            "host": self.host,
        })
    }
}
