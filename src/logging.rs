//! Structured tracing macros shared by the HTTP, service and storage layers.
//!
//! Every event carries an `operation` field; study-specific identifiers
//! (`user_id`, `contest_id`, `flashcard_id`) are recorded with `Display`.

// HTTP handlers

#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, user_id = $user_id:expr, flashcard_id = $flashcard_id:expr) => {
        tracing::debug!(
            operation = $operation,
            user_id = %$user_id,
            flashcard_id = %$flashcard_id,
            "Request received"
        );
    };
    ($operation:expr, user_id = $user_id:expr, contest_id = $contest_id:expr) => {
        tracing::debug!(
            operation = $operation,
            user_id = %$user_id,
            contest_id = %$contest_id,
            "Request received"
        );
    };
    ($operation:expr, user_id = $user_id:expr) => {
        tracing::debug!(operation = $operation, user_id = %$user_id, "Request received");
    };
}

#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, flashcard_id = $flashcard_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            flashcard_id = %$flashcard_id,
            "Request handled: {}", $msg
        );
    };
    ($operation:expr, contest_id = $contest_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            contest_id = %$contest_id,
            "Request handled: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(operation = $operation, count = $count, "Request handled: {}", $msg);
    };
}

#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, flashcard_id = $flashcard_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            flashcard_id = %$flashcard_id,
            "Request rejected: {}", $msg
        );
    };
    ($operation:expr, contest_id = $contest_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            contest_id = %$contest_id,
            "Request rejected: {}", $msg
        );
    };
}

// Service layer

#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, flashcard_id = $flashcard_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            flashcard_id = %$flashcard_id,
            "Service call started"
        );
    };
    ($service:expr, $operation:expr, contest_id = $contest_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            contest_id = %$contest_id,
            "Service call started"
        );
    };
}

#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, card_count = $count:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            card_count = $count,
            duration_ms = $duration,
            "Service call finished"
        );
    };
    (
        $service:expr,
        $operation:expr,
        flashcard_id = $flashcard_id:expr,
        duration_ms = $duration:expr
    ) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            flashcard_id = %$flashcard_id,
            duration_ms = $duration,
            "Service call finished"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service call finished: {}", $msg
        );
    };
}

#[macro_export]
macro_rules! log_service_error {
    ($service:expr, $operation:expr, flashcard_id = $flashcard_id:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            flashcard_id = %$flashcard_id,
            error = %$error,
            "Service call failed"
        );
    };
}

#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(service = $service, operation = $operation, "Service warning: {}", $msg);
    };
}

// Storage

/// Timing for store calls. `debug` variants carry a duration, `info` marks
/// one-off events such as schema setup.
#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, flashcard_id = $flashcard_id:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            flashcard_id = %$flashcard_id,
            duration_ms = $duration,
            "Query finished"
        );
    };
    (debug, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            result_count = $count,
            duration_ms = $duration,
            "Query finished"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(component = "database", operation = $operation, "{}", $msg);
    };
}

// Process lifecycle and configuration

#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(event_type = "startup", component = $component, "{}", $msg);
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(event_type = "shutdown", component = $component, "{}", $msg);
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "{}", $msg);
    };
}

#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "{}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
