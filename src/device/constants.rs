use uuid::Uuid;

/**
 * How long (milliseconds) to wait before connecting again after a connection attempt failed or
 * the link was lost.
 */
pub const CONNECT_DELAY: u64 = 1000;

/**
 * How long (milliseconds) disconnecting may take when the connection is stopped.
 */
pub const SHUTDOWN_DEADLINE: u64 = 2000;

/**
 * The local name advertised by the charge monitor firmware.
 */
pub const VAN_CHARGE_MONITOR_NAME: &str = "VAN Charge Monitor";

/**
 * The UUID of the remote GATT characteristic that notifies the charger status as a string.
 */
pub const VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0xe5d3a406_a784_4bb1_947b_630a9732098a);

/**
 * MTU to ask for once connected, the status string does not fit in the default 23 byte MTU.
 */
pub const REQUESTED_MTU: u16 = 256;

/**
 * Telemetry older than this (seconds) is no longer considered valid.
 */
pub const STALE_AFTER: u64 = 60 * 5;

/**
 * Capacity of the channels that carry device events to display sinks.
 */
pub const EVENT_CHANNEL_SIZE: usize = 64;
