#[derive(Clone, Debug)]
pub struct StaticConfigItem {
    pub key: &'static str,
    pub description: &'static str,
    pub value_type: &'static str,
    pub default_value: &'static str,
}

pub static STATIC_CONFIG_TABLE: &[StaticConfigItem] = &[
    StaticConfigItem {
        key: "security.allowed_addr_pattern",
        description: "Regular expression every client address must fully match (empty allows all)",
        value_type: "string",
        default_value: "",
    },
    StaticConfigItem {
        key: "collector.timeout_ms",
        description: "Timeout for each call to a monitored instance in milliseconds",
        value_type: "number",
        default_value: "10000",
    },
    StaticConfigItem {
        key: "collector.monitoring_path",
        description: "Path appended to instance base URLs to reach their monitoring endpoint",
        value_type: "string",
        default_value: "/monitoring",
    },
    StaticConfigItem {
        key: "collector.user_agent",
        description: "User agent sent to monitored instances",
        value_type: "string",
        default_value: "monitoring-collector",
    },
    StaticConfigItem {
        key: "collector.resolution_seconds",
        description: "Interval of the periodic collection (0 disables it)",
        value_type: "number",
        default_value: "60",
    },
    StaticConfigItem {
        key: "collector.history_limit",
        description: "Number of history points attached to a main report",
        value_type: "number",
        default_value: "120",
    },
    StaticConfigItem {
        key: "storage.applications_path",
        description: "JSON file holding registered applications (empty keeps them in memory)",
        value_type: "string",
        default_value: "",
    },
    StaticConfigItem {
        key: "log.requests",
        description: "Log every routed request",
        value_type: "boolean",
        default_value: "false",
    },
];
