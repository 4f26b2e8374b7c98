//! Canonical structured event names used across `hive-hub`.

// Registry events.
pub const REGISTRY_INSERT: &str = "registry_insert";
pub const REGISTRY_REPLACE: &str = "registry_replace";
pub const REGISTRY_REMOVE: &str = "registry_remove";
pub const REGISTRY_REMOVE_PAIRS: &str = "registry_remove_pairs";
pub const REGISTRY_LOOKUP_EMPTY: &str = "registry_lookup_empty";

// Sink events.
pub const SINK_RESOLVED: &str = "sink_resolved";
pub const SINK_RESOLVE_IGNORED: &str = "sink_resolve_ignored";
pub const SINK_PUSH_DROPPED: &str = "sink_push_dropped";
pub const SINK_PUSH_DUPLICATE: &str = "sink_push_duplicate";
pub const SINK_RECEIVER_CLOSED: &str = "sink_receiver_closed";
pub const SINK_CLOSED: &str = "sink_closed";

// Engine events.
pub const POLL_IMMEDIATE: &str = "poll_immediate";
pub const POLL_REGISTERED: &str = "poll_registered";
pub const POLL_BACKLOG_HIT: &str = "poll_backlog_hit";
pub const POLL_COMPLETE: &str = "poll_complete";
pub const POLL_BACKLOG_FAILED: &str = "poll_backlog_failed";
pub const SUBSCRIBE_OK: &str = "subscribe_ok";
pub const SUBSCRIBE_FAILED: &str = "subscribe_failed";
pub const UNSUBSCRIBE_OK: &str = "unsubscribe_ok";
pub const DISPATCH_FANOUT: &str = "dispatch_fanout";
pub const PUBLISH_OK: &str = "publish_ok";
pub const PUBLISH_FAILED: &str = "publish_failed";
pub const GUARD_RELEASE: &str = "guard_release";

// Session events.
pub const SESSION_OPEN: &str = "session_open";
pub const SESSION_CLOSE: &str = "session_close";
pub const SESSION_REQUEST_FAILED: &str = "session_request_failed";
pub const SESSION_LEGACY_UNSUBSCRIBE: &str = "session_legacy_unsubscribe";

// Long-poll adapter events.
pub const LONG_POLL_REJECTED: &str = "long_poll_rejected";
pub const LONG_POLL_NO_DEVICES: &str = "long_poll_no_devices";
pub const LONG_POLL_RESPONSE: &str = "long_poll_response";

// RPC events.
pub const RPC_REQUEST: &str = "rpc_request";
pub const RPC_ERROR_RESPONSE: &str = "rpc_error_response";
pub const RPC_DECODE_FAILED: &str = "rpc_decode_failed";
