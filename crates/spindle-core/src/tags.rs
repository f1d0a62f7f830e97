/// Name of a published process value across the log and metric surfaces.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const SMOOTHED_RPM: Tag = Tag {
    key: "smoothed_rpm",
    metric: "spindle_smoothed_rpm",
};

pub const TARGET_RPM: Tag = Tag {
    key: "target_rpm",
    metric: "spindle_target_rpm",
};

pub const POWER_PERCENT: Tag = Tag {
    key: "power_percent",
    metric: "spindle_power_percent",
};

pub const TICK_LATENESS_US: Tag = Tag {
    key: "tick_lateness_us",
    metric: "spindle_tick_lateness_microseconds",
};

pub const CONTROL_MODE: Tag = Tag {
    key: "control_mode",
    metric: "spindle_control_mode",
};
