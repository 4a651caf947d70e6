use graphql_sse_api::config::ApiConfig;
use validator::Validate;

fn default_greeting() -> String {
    "Hello, world!".to_string()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, smart_default::SmartDefault, Validate)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    #[validate(nested)]
    pub demo: DemoConfig,
}

/// Settings of the example schema
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, smart_default::SmartDefault, Validate)]
#[serde(default)]
pub struct DemoConfig {
    /// Greeting served until the first `setGreeting` mutation
    #[default(_code = "default_greeting()")]
    #[validate(length(min = 1))]
    pub initial_greeting: String,

    /// Milliseconds between two values of the `countdown` subscription
    #[default(1000)]
    #[validate(range(min = 1, max = 60000))]
    pub countdown_step_millis: u64,
}
