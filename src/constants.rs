pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:50051";

pub const DEFAULT_TARGET: &str = "localhost:50051";

pub const EXAMPLE_SCHEME: &str = "example";

pub const EXAMPLE_SERVICE: &str = "example";

pub const EXAMPLE_ADDRS: [&str; 2] = ["localhost:50051", "localhost:50052"];

pub const PASSTHROUGH_SCHEME: &str = "passthrough";

pub const TIMESTAMP_KEY: &str = "timestamp";

pub const HANDLER_DELAY_MS: u64 = 3000; // simulated work per call

pub const RETRY_DELAY_SECS: u64 = 3;

pub const CONNECT_TIMEOUT_MS: u64 = 5000;

pub const CLIENT_CONFIG_ENV: &str = "GREETER_CLIENT_CONFIG";

pub const SERVER_CONFIG_ENV: &str = "GREETER_SERVER_CONFIG";
