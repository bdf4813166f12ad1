/// Rate Limiting System
use crate::{
    context::AppContext,
    error::{MarketError, MarketResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-tier request quotas
#[derive(Debug, Clone)]
pub struct LimiterQuotas {
    /// Requests per second for authenticated users
    pub authenticated_rps: u32,
    /// Requests per second for unauthenticated users
    pub unauthenticated_rps: u32,
    /// Requests per second on admin routes
    pub admin_rps: u32,
    pub burst_size: u32,
}

impl Default for LimiterQuotas {
    fn default() -> Self {
        Self {
            authenticated_rps: 50,
            unauthenticated_rps: 10,
            admin_rps: 200,
            burst_size: 25,
        }
    }
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
    admin: Arc<DirectLimiter>,
}

fn quota(rps: u32, burst: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN))
}

fn check(limiter: &DirectLimiter) -> MarketResult<()> {
    limiter.check().map_err(|_| MarketError::RateLimitExceeded {
        retry_after: Duration::from_secs(1),
    })
}

impl RateLimiter {
    pub fn new(quotas: LimiterQuotas) -> Self {
        Self {
            authenticated: Arc::new(GovernorLimiter::direct(quota(
                quotas.authenticated_rps,
                quotas.burst_size,
            ))),
            unauthenticated: Arc::new(GovernorLimiter::direct(quota(
                quotas.unauthenticated_rps,
                quotas.burst_size / 5,
            ))),
            admin: Arc::new(GovernorLimiter::direct(quota(
                quotas.admin_rps,
                quotas.burst_size * 2,
            ))),
        }
    }

    pub fn check_authenticated(&self) -> MarketResult<()> {
        check(&self.authenticated)
    }

    pub fn check_unauthenticated(&self) -> MarketResult<()> {
        check(&self.unauthenticated)
    }

    pub fn check_admin(&self) -> MarketResult<()> {
        check(&self.admin)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, MarketError> {
    if !ctx.config.rate_limit.enabled {
        return Ok(next.run(request).await);
    }

    let is_admin = request.uri().path().starts_with("/api/admin");
    let has_auth_header = request.headers().contains_key("authorization");

    if is_admin && has_auth_header {
        ctx.rate_limiter.check_admin()?;
    } else if has_auth_header {
        ctx.rate_limiter.check_authenticated()?;
    } else {
        ctx.rate_limiter.check_unauthenticated()?;
    }

    Ok(next.run(request).await)
}
