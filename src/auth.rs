/// Authentication extractors
///
/// Every extractor resolves the bearer token to an account row. The role
/// used for admin checks always comes from that row.
use crate::{
    account::ValidatedSession,
    api::middleware::extract_bearer_token,
    context::AppContext,
    db::account::Account,
    error::MarketError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - extracts and validates session from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: Account,
    pub session: ValidatedSession,
}

impl AuthContext {
    pub fn account_id(&self) -> &str {
        &self.account.id
    }
}

async fn authenticate(token: &str, state: &AppContext) -> Result<AuthContext, MarketError> {
    let session = state.account_manager.validate_access_token(token)?;

    let account = state
        .account_manager
        .find_account(&session.account_id)
        .await?
        .ok_or_else(|| MarketError::Unauthorized("Account no longer exists".to_string()))?;

    Ok(AuthContext { account, session })
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| MarketError::Unauthorized("Missing authorization header".to_string()))?;

        authenticate(&token, state).await
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_bearer_token(&parts.headers) {
            Some(token) => match authenticate(&token, state).await {
                Ok(auth) => Some(auth),
                Err(MarketError::Unauthorized(_)) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

/// Admin authentication context - requires the stored account to be an admin
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub account: Account,
    pub session: ValidatedSession,
}

impl AdminAuthContext {
    pub fn admin_id(&self) -> &str {
        &self.account.id
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { account, session } = AuthContext::from_request_parts(parts, state).await?;

        if !account.is_admin() {
            tracing::warn!(account_id = %account.id, "Non-admin attempted admin action");
            return Err(MarketError::Forbidden("Admin role required".to_string()));
        }

        Ok(AdminAuthContext { account, session })
    }
}
