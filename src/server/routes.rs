use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{async_trait, middleware, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::matches::types::{
    DisputeRecord, MatchId, MatchPage, MatchSnapshot, MatchSummary, Settlement,
};
use crate::matches::MatchService;
use crate::realtime::auth::bearer_token;
use crate::realtime::{ws_handler, AuthenticatedUser, Authenticator, Gateway};

use super::dto::{
    CreateMatchBody, DisputeBody, LobbyQuery, PageQuery, ReadyResponse, ResolveBody,
    StatusResponse,
};
use super::error::ApiError;
use super::logging::log_requests;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub service: Arc<dyn MatchService>,
    pub auth: Arc<Authenticator>,
    pub gateway: Gateway,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<Authenticator>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<Authenticator>::from_ref(state);
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
        Ok(auth.authenticate(token).await?)
    }
}

/// HTTP surface of the match engine: REST lifecycle, lobby queries and the socket upgrade.
pub struct LudoServer {
    router: Router,
}

impl LudoServer {
    pub fn new(state: AppState) -> Self {
        let router = Router::new()
            .route("/health", get(health))
            .route("/ludo/ws", get(ws_handler))
            .route("/ludo/lobby", get(lobby))
            .route("/ludo/my-matches", get(my_matches))
            .route("/ludo/match/create", post(create_match))
            .route("/ludo/match/:match_id", get(match_summary))
            .route("/ludo/match/:match_id/state", get(match_state))
            .route("/ludo/match/:match_id/join", post(join_match))
            .route("/ludo/match/:match_id/ready", post(player_ready))
            .route("/ludo/match/:match_id/leave", post(leave_match))
            .route("/ludo/match/:match_id/dispute", post(create_dispute))
            .route("/admin/ludo/match/:match_id/resolve", post(resolve_match))
            .layer(middleware::from_fn(log_requests))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state);

        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn lobby(
    State(service): State<Arc<dyn MatchService>>,
    Query(query): Query<LobbyQuery>,
) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    Ok(Json(service.lobby(query.into()).await?))
}

async fn my_matches(
    State(service): State<Arc<dyn MatchService>>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<MatchPage>, ApiError> {
    Ok(Json(service.my_matches(user.user_id, query.into()).await?))
}

async fn create_match(
    State(service): State<Arc<dyn MatchService>>,
    user: AuthenticatedUser,
    Json(body): Json<CreateMatchBody>,
) -> Result<(StatusCode, Json<MatchSummary>), ApiError> {
    let summary = service.create_match(user.user_id, body.into()).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn match_summary(
    State(service): State<Arc<dyn MatchService>>,
    _user: AuthenticatedUser,
    Path(match_id): Path<MatchId>,
) -> Result<Json<MatchSummary>, ApiError> {
    Ok(Json(service.match_summary(match_id).await?))
}

async fn match_state(
    State(service): State<Arc<dyn MatchService>>,
    _user: AuthenticatedUser,
    Path(match_id): Path<MatchId>,
) -> Result<Json<MatchSnapshot>, ApiError> {
    Ok(Json(service.match_state(match_id).await?))
}

async fn join_match(
    State(service): State<Arc<dyn MatchService>>,
    user: AuthenticatedUser,
    Path(match_id): Path<MatchId>,
) -> Result<Json<MatchSummary>, ApiError> {
    Ok(Json(service.join_match(user.user_id, match_id).await?))
}

async fn player_ready(
    State(service): State<Arc<dyn MatchService>>,
    user: AuthenticatedUser,
    Path(match_id): Path<MatchId>,
) -> Result<Json<ReadyResponse>, ApiError> {
    let outcome = service.player_ready(user.user_id, match_id).await?;
    Ok(Json(ReadyResponse::from_outcome(match_id, &outcome)))
}

async fn leave_match(
    State(service): State<Arc<dyn MatchService>>,
    user: AuthenticatedUser,
    Path(match_id): Path<MatchId>,
) -> Result<Json<StatusResponse>, ApiError> {
    service.leave_match(user.user_id, match_id).await?;
    Ok(Json(StatusResponse::OK))
}

async fn create_dispute(
    State(service): State<Arc<dyn MatchService>>,
    user: AuthenticatedUser,
    Path(match_id): Path<MatchId>,
    Json(body): Json<DisputeBody>,
) -> Result<(StatusCode, Json<DisputeRecord>), ApiError> {
    let dispute = service
        .create_dispute(user.user_id, match_id, body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

async fn resolve_match(
    State(service): State<Arc<dyn MatchService>>,
    user: AuthenticatedUser,
    Path(match_id): Path<MatchId>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<Settlement>, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin role required".to_owned()));
    }
    Ok(Json(
        service
            .resolve_match(user.user_id, match_id, body.into())
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::MatchRules;
    use crate::coordination::InMemoryCoordinationStore;
    use crate::engine::ludo::UserId;
    use crate::matches::types::UserRole;
    use crate::matches::{InMemoryMatchStorage, MatchLifecycle, MatchLifecycleParts};
    use crate::notify::LogNotifier;
    use crate::realtime::auth::Claims;
    use crate::realtime::RoomHub;
    use crate::test_utils::ScriptedDice;

    const SECRET: &[u8] = b"router-secret";

    fn app(storage: &InMemoryMatchStorage) -> Router {
        let hub = Arc::new(RoomHub::new());
        let service: Arc<dyn MatchService> = MatchLifecycle::new(MatchLifecycleParts {
            storage: Arc::new(storage.clone()),
            coordination: Arc::new(InMemoryCoordinationStore::new()),
            broadcaster: hub.clone(),
            notifier: Arc::new(LogNotifier),
            dice: ScriptedDice::new(Vec::new()),
            rules: MatchRules::default(),
        });
        let auth = Arc::new(Authenticator::new(SECRET, Arc::new(storage.clone())));
        let gateway = Gateway::new(service.clone(), hub, auth.clone());
        LudoServer::new(AppState {
            service,
            auth,
            gateway,
        })
        .into_router()
    }

    fn bearer(user_id: UserId) -> String {
        let claims = Claims {
            sub: user_id,
            exp: (Utc::now().timestamp() + 600) as u64,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET))
            .expect("token encodes");
        format!("Bearer {token}")
    }

    async fn body_json(response: axum::response::Response) -> anyhow::Result<Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn health_is_public() -> anyhow::Result<()> {
        let storage = InMemoryMatchStorage::new();
        let response = app(&storage)
            .oneshot(Request::get("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&bytes[..], b"ok");
        Ok(())
    }

    #[tokio::test]
    async fn lifecycle_routes_require_a_token() -> anyhow::Result<()> {
        let storage = InMemoryMatchStorage::new();
        let response = app(&storage)
            .oneshot(
                Request::post("/ludo/match/create")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "game_mode": "ONE_V_ONE", "entry_fee": "5" }).to_string(),
                    ))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await?["error"], "missing bearer token");
        Ok(())
    }

    #[tokio::test]
    async fn created_match_shows_up_in_the_lobby() -> anyhow::Result<()> {
        let storage = InMemoryMatchStorage::new();
        let host = storage.seed_user("host", UserRole::User).await;
        storage.seed_wallet(host, Decimal::from(40), Decimal::ZERO).await;
        let router = app(&storage);

        let created = router
            .clone()
            .oneshot(
                Request::post("/ludo/match/create")
                    .header(header::AUTHORIZATION, bearer(host))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "game_mode": "ONE_V_ONE", "entry_fee": "10" }).to_string(),
                    ))?,
            )
            .await?;
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = body_json(created).await?;

        let lobby = router
            .oneshot(Request::get("/ludo/lobby?game_mode=ONE_V_ONE").body(Body::empty())?)
            .await?;
        assert_eq!(lobby.status(), StatusCode::OK);
        let lobby = body_json(lobby).await?;
        assert_eq!(lobby.as_array().map(Vec::len), Some(1));
        assert_eq!(lobby[0]["id"], created["id"]);
        Ok(())
    }

    #[tokio::test]
    async fn resolve_is_admin_only() -> anyhow::Result<()> {
        let storage = InMemoryMatchStorage::new();
        let player = storage.seed_user("player", UserRole::User).await;
        let response = app(&storage)
            .oneshot(
                Request::post(format!("/admin/ludo/match/{}/resolve", uuid::Uuid::new_v4()))
                    .header(header::AUTHORIZATION, bearer(player))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "winner_id": player }).to_string()))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_match_is_not_found() -> anyhow::Result<()> {
        let storage = InMemoryMatchStorage::new();
        let player = storage.seed_user("player", UserRole::User).await;
        let response = app(&storage)
            .oneshot(
                Request::get(format!("/ludo/match/{}/state", uuid::Uuid::new_v4()))
                    .header(header::AUTHORIZATION, bearer(player))
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }
}
