//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and
//! `/config/*` sit at the root.

pub mod dto;
pub mod extract;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::http::{StatusCode, Uri};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::config::LedgerConfig;
use crate::error::LedgerError;

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "encounter-ledger",
        description = "Encounter ingestion with cross-user deduplication and a module loadout optimizer."
    ),
    paths(
        handlers::upload::upload_encounters,
        handlers::upload::check_hashes,
        handlers::modules::replace_modules,
        handlers::modules::list_modules,
        handlers::optimizer::optimize,
        handlers::system::health_handler,
        handlers::system::scoring_tables_handler,
    ),
    components(schemas(crate::error::ErrorResponse, crate::error::ErrorBody)),
    tags(
        (name = "Upload", description = "Encounter ingestion"),
        (name = "Modules", description = "Module inventory"),
        (name = "Optimizer", description = "Loadout optimization"),
        (name = "System", description = "Health and configuration"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .fallback(not_found);

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

/// Unknown paths answer with the regular JSON error body.
async fn not_found(uri: Uri) -> LedgerError {
    LedgerError::NotFound(uri.path().to_string())
}

/// Builds the served application: routes, middleware and state.
pub fn build_app(state: AppState, config: &LedgerConfig) -> Router {
    build_router()
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, Response};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::persistence::memory::MemoryStore;

    fn app_with(store: &Arc<MemoryStore>) -> Router {
        let config = LedgerConfig::default();
        build_app(AppState::from_store(&config, Arc::clone(store)), &config)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let Ok(request) = builder.body(body) else {
            panic!("request builder failed");
        };
        let Ok(response) = app.clone().oneshot(request).await;
        response
    }

    async fn body_json(response: Response<Body>) -> Value {
        let Ok(collected) = response.into_body().collect().await else {
            panic!("body read failed");
        };
        let Ok(value) = serde_json::from_slice(&collected.to_bytes()) else {
            panic!("body is not JSON");
        };
        value
    }

    fn encounter(local: i64) -> Value {
        json!({
            "startedAtMs": 1_700_000_010_000_i64,
            "endedAtMs": 1_700_000_100_000_i64,
            "totalDmg": 10_000,
            "sceneId": 101,
            "sceneName": "Dragon Lair",
            "bosses": [{ "name": "Dragon Boss", "defeated": true }],
            "actors": [
                { "actorId": 1001, "isPlayer": true, "isLocalPlayer": local == 1001, "damageDealt": 3000 },
                { "actorId": 1002, "isPlayer": true, "isLocalPlayer": local == 1002, "damageDealt": 4000 },
                { "actorId": 1003, "isPlayer": true, "isLocalPlayer": local == 1003, "damageDealt": 3000 },
                { "actorId": 9000, "isPlayer": false, "damageDealt": 0 }
            ],
            "attempts": [{ "index": 0, "startedAtMs": 1_700_000_010_000_i64, "totalDeaths": 0 }]
        })
    }

    fn module(idx: u32, attrs: &[(&str, i32)]) -> Value {
        let attributes: Vec<Value> = attrs
            .iter()
            .zip(1..)
            .map(|((name, value), part_id)| {
                json!({ "partId": part_id, "name": name, "value": value, "type": "basic" })
            })
            .collect();
        json!({
            "uuid": format!("00000000-0000-4000-8000-{idx:012}"),
            "name": format!("Module {idx}"),
            "configId": 5_500_100 + idx,
            "quality": 4,
            "category": "attack",
            "attributes": attributes,
        })
    }

    #[tokio::test]
    async fn health_reports_version() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let response = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let response = send(&app, Method::GET, "/api/v1/encounters/9", Some("1"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 2001);
        assert_eq!(body["error"]["message"], "not found: /api/v1/encounters/9");
    }

    #[tokio::test]
    async fn scoring_tables_are_served() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let response = send(&app, Method::GET, "/config/scoring-tables", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["levelThresholds"], json!([1, 4, 8, 12, 16, 20]));
    }

    #[tokio::test]
    async fn missing_caller_is_unauthorized() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let payload = json!({ "encounters": [encounter(1001)] });
        let response = send(&app, Method::POST, "/api/v1/upload/encounters", None, Some(payload)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 1201);
    }

    #[tokio::test]
    async fn same_fight_from_two_players_shares_an_id() {
        let store = Arc::new(MemoryStore::new());
        let app = app_with(&store);

        let first = send(
            &app,
            Method::POST,
            "/api/v1/upload/encounters",
            Some("1"),
            Some(json!({ "encounters": [encounter(1001)] })),
        )
        .await;
        assert_eq!(first.status(), StatusCode::OK);
        let first = body_json(first).await;
        assert_eq!(first["ingested"], 1);

        let second = send(
            &app,
            Method::POST,
            "/api/v1/upload/encounters",
            Some("2"),
            Some(json!({ "encounters": [encounter(1002)] })),
        )
        .await;
        let second = body_json(second).await;
        assert_eq!(second["ingested"], 0);
        assert_eq!(first["ids"][0], second["ids"][0]);
        assert_eq!(store.encounter_count().await, 1);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let response = send(
            &app,
            Method::POST,
            "/api/v1/upload/encounters",
            Some("1"),
            Some(json!({ "encounters": [] })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 1001);
    }

    #[tokio::test]
    async fn check_partitions_known_and_unknown_hashes() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let mut enc = encounter(1001);
        enc["sourceHash"] = json!("client-abc");
        let uploaded = send(
            &app,
            Method::POST,
            "/api/v1/upload/encounters",
            Some("1"),
            Some(json!({ "encounters": [enc] })),
        )
        .await;
        let uploaded = body_json(uploaded).await;

        let response = send(
            &app,
            Method::POST,
            "/api/v1/upload/check",
            Some("1"),
            Some(json!({ "hashes": ["client-abc", "client-xyz"] })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["duplicates"][0]["hash"], "client-abc");
        assert_eq!(body["duplicates"][0]["encounterId"], uploaded["ids"][0]);
        assert_eq!(body["missing"], json!(["client-xyz"]));
    }

    #[tokio::test]
    async fn modules_round_trip_and_paginate() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let modules: Vec<Value> = (1..=5)
            .map(|i| module(i, &[("Strength Boost", 4), ("Armor", 2)]))
            .collect();
        let response = send(
            &app,
            Method::PUT,
            "/api/v1/modules",
            Some("7"),
            Some(json!({ "modules": modules })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["stored"], 5);

        let response = send(
            &app,
            Method::GET,
            "/api/v1/modules?category=ATTACK&page=2&perPage=2",
            Some("7"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["pagination"]["total"], 5);
        assert_eq!(body["pagination"]["totalPages"], 3);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["data"][0]["category"], "ATTACK");

        let response = send(&app, Method::GET, "/api/v1/modules", Some("8"), None).await;
        assert_eq!(body_json(response).await["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn optimize_computes_then_serves_from_cache() {
        let store = Arc::new(MemoryStore::new());
        let app = app_with(&store);
        let modules: Vec<Value> = (1..=6)
            .map(|i| {
                let value = i32::try_from(i).unwrap_or(1);
                module(i, &[("Strength Boost", value), ("Crit Focus", 3)])
            })
            .collect();
        let stored = send(
            &app,
            Method::PUT,
            "/api/v1/modules",
            Some("3"),
            Some(json!({ "modules": modules })),
        )
        .await;
        assert_eq!(stored.status(), StatusCode::OK);

        let request = json!({
            "category": "ATTACK",
            "preferences": { "priorityAttributes": ["Strength Boost"] },
            "constraints": { "maxSolutions": 5 }
        });
        let response = send(
            &app,
            Method::POST,
            "/api/v1/module-optimizer/optimize",
            Some("3"),
            Some(request.clone()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let fresh = body_json(response).await;
        assert_eq!(fresh["metadata"]["cacheHit"], false);
        assert_eq!(fresh["metadata"]["totalModules"], 6);
        assert_eq!(fresh["metadata"]["algorithm"], "greedy+local_search");
        assert_eq!(fresh["solutions"][0]["rank"], 1);
        assert_eq!(fresh["solutions"][0]["modules"].as_array().map(Vec::len), Some(4));

        for _ in 0..100 {
            if store.cache_len().await > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let response = send(
            &app,
            Method::POST,
            "/api/v1/module-optimizer/optimize",
            Some("3"),
            Some(request),
        )
        .await;
        let cached = body_json(response).await;
        assert_eq!(cached["metadata"]["cacheHit"], true);
        assert_eq!(cached["solutions"], fresh["solutions"]);
    }

    #[tokio::test]
    async fn replacing_modules_invalidates_cached_loadouts() {
        let store = Arc::new(MemoryStore::new());
        let app = app_with(&store);
        let first: Vec<Value> = (1..=4).map(|i| module(i, &[("Armor", 3)])).collect();
        let stored = send(
            &app,
            Method::PUT,
            "/api/v1/modules",
            Some("4"),
            Some(json!({ "modules": first })),
        )
        .await;
        assert_eq!(stored.status(), StatusCode::OK);

        let request = json!({ "category": "ATTACK" });
        let response = send(
            &app,
            Method::POST,
            "/api/v1/module-optimizer/optimize",
            Some("4"),
            Some(request.clone()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        for _ in 0..100 {
            if store.cache_len().await > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let second: Vec<Value> = (11..=14).map(|i| module(i, &[("Agile", 2)])).collect();
        let stored = send(
            &app,
            Method::PUT,
            "/api/v1/modules",
            Some("4"),
            Some(json!({ "modules": second })),
        )
        .await;
        assert_eq!(stored.status(), StatusCode::OK);

        let listed = send(&app, Method::GET, "/api/v1/modules", Some("4"), None).await;
        let listed = body_json(listed).await;
        let owned: Vec<Value> = listed["data"]
            .as_array()
            .map(|data| data.iter().map(|m| m["id"].clone()).collect())
            .unwrap_or_default();
        assert_eq!(owned.len(), 4);

        let response = send(
            &app,
            Method::POST,
            "/api/v1/module-optimizer/optimize",
            Some("4"),
            Some(request),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["metadata"]["cacheHit"], false);
        let returned: Vec<Value> = body["solutions"][0]["modules"]
            .as_array()
            .map(|mods| mods.iter().map(|m| m["id"].clone()).collect())
            .unwrap_or_default();
        assert_eq!(returned.len(), 4);
        assert!(returned.iter().all(|id| owned.contains(id)));
    }

    #[tokio::test]
    async fn optimize_rejects_unknown_category() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let response = send(
            &app,
            Method::POST,
            "/api/v1/module-optimizer/optimize",
            Some("3"),
            Some(json!({ "category": "HEALER" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], 1002);
    }

    #[tokio::test]
    async fn optimize_reports_missing_inventory() {
        let app = app_with(&Arc::new(MemoryStore::new()));
        let response = send(
            &app,
            Method::POST,
            "/api/v1/module-optimizer/optimize",
            Some("3"),
            Some(json!({ "category": "DEFENSE" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], 1101);
    }

    #[test]
    fn openapi_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/upload/encounters",
            "/api/v1/upload/check",
            "/api/v1/modules",
            "/api/v1/module-optimizer/optimize",
            "/health",
            "/config/scoring-tables",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
