// Redis Connection Setup

use crate::settings::RedisSettings;
use redis::aio::MultiplexedConnection;
use redis::ErrorKind;
use retask_core::error::{AppError, Result};
use tracing::debug;

/// Map a redis error onto the worker's error taxonomy
///
/// - unreachable / dropped / refused / timed out / rejected credentials → `Connection`
/// - reply of the wrong shape or a server-side error reply → `Protocol`
/// - unusable client settings → `Config`
pub fn classify_redis_error(err: redis::RedisError, context: &str) -> AppError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        return AppError::Connection(format!("{}: {}", context, err));
    }

    match err.kind() {
        ErrorKind::InvalidClientConfig => AppError::Config(format!("{}: {}", context, err)),
        ErrorKind::AuthenticationFailed => {
            AppError::Connection(format!("{}: authentication failed: {}", context, err))
        }
        ErrorKind::TypeError | ErrorKind::ResponseError => {
            AppError::Protocol(format!("{}: {}", context, err))
        }
        // Anything else: assume the session is unusable
        _ => AppError::Connection(format!("{}: {}", context, err)),
    }
}

/// Open a verified connection to Redis
///
/// The whole handshake (TCP connect + PING) is bounded by
/// `settings.connect_timeout`.
pub async fn open_connection(settings: &RedisSettings) -> Result<MultiplexedConnection> {
    let client = redis::Client::open(settings.connection_url().as_str())
        .map_err(|e| classify_redis_error(e, "invalid redis settings"))?;

    let handshake = async {
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| classify_redis_error(e, "connect"))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| classify_redis_error(e, "PING"))?;

        if pong != "PONG" {
            return Err(AppError::Protocol(format!(
                "unexpected PING reply: {:?}",
                pong
            )));
        }

        if let Some(name) = &settings.client_name {
            let _: () = redis::cmd("CLIENT")
                .arg("SETNAME")
                .arg(name)
                .query_async(&mut conn)
                .await
                .map_err(|e| classify_redis_error(e, "CLIENT SETNAME"))?;
        }

        Ok(conn)
    };

    let conn = tokio::time::timeout(settings.connect_timeout, handshake)
        .await
        .map_err(|_| {
            AppError::Connection(format!(
                "connect to {} timed out after {:?}",
                settings.display_url(),
                settings.connect_timeout
            ))
        })??;

    debug!(url = %settings.display_url(), "Redis connection established");
    Ok(conn)
}
