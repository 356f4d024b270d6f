pub mod health;

use axum::{
    routing::{delete, get, patch, post},
    Extension, Router,
};

use crate::ledger::handlers;
use crate::models::catalog::CatalogKind;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .nest("/api/v1/members", member_routes())
        .nest("/api/v1/chores", catalog_routes(CatalogKind::Chore))
        .nest("/api/v1/rewards", catalog_routes(CatalogKind::Reward))
        .with_state(state)
}

fn member_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::handle_list_members).post(handlers::handle_create_member),
        )
        .route(
            "/:id",
            get(handlers::handle_get_member)
                .patch(handlers::handle_edit_member)
                .delete(handlers::handle_delete_member),
        )
        .route("/:id/deductions", post(handlers::handle_deduct_points))
        .route(
            "/:id/deductions/:deduction_id",
            delete(handlers::handle_delete_deduction),
        )
        .route(
            "/:id/chores/:item_id",
            delete(handlers::handle_unlink_item).layer(Extension(CatalogKind::Chore)),
        )
        .route(
            "/:id/rewards/:item_id",
            delete(handlers::handle_unlink_item).layer(Extension(CatalogKind::Reward)),
        )
}

/// Chores and rewards expose the same lifecycle routes; only the verb for using
/// an item differs (claim a chore, redeem a reward).
fn catalog_routes(kind: CatalogKind) -> Router<AppState> {
    let use_route = match kind {
        CatalogKind::Chore => "/:id/claim",
        CatalogKind::Reward => "/:id/redeem",
    };

    Router::new()
        .route(
            "/",
            get(handlers::handle_list_active).post(handlers::handle_add_item),
        )
        .route("/removed", get(handlers::handle_list_removed))
        .route(
            "/:id",
            patch(handlers::handle_edit_item).delete(handlers::handle_soft_delete),
        )
        .route("/:id/restore", post(handlers::handle_restore))
        .route("/:id/relation", get(handlers::handle_check_relation))
        .route("/:id/permanent", delete(handlers::handle_delete_permanently))
        .route(use_route, post(handlers::handle_use_item))
        .layer(Extension(kind))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::testing::{config, mint_token, SECRET};
    use crate::store::MemoryStore;

    fn app() -> Router {
        build_router(AppState {
            store: Arc::new(MemoryStore::new()),
            config: config(),
        })
    }

    fn token(owner: &str) -> String {
        mint_token(owner, SECRET, chrono::Duration::hours(1))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(t) = token {
            builder = builder.header("authorization", format!("Bearer {t}"));
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_store_backend() {
        let app = app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/members", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_malformed_authorization_header_is_unauthorized() {
        let app = app();
        let request = Request::builder()
            .uri("/api/v1/chores")
            .header("authorization", "Token abc")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_claim_and_permanent_delete_round_trip() {
        let app = app();
        let t = token("user_family");
        let t = Some(t.as_str());

        let (status, alice) = send(
            &app,
            "POST",
            "/api/v1/members",
            t,
            Some(json!({ "name": "Alice", "role": "daughter" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let alice_id = alice["id"].as_i64().unwrap();

        let (status, chore) = send(
            &app,
            "POST",
            "/api/v1/chores",
            t,
            Some(json!({ "name": "Dishes", "points": 50 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(chore["status"], "active");
        assert_eq!(chore["members"], json!([]));
        let chore_id = chore["id"].as_i64().unwrap();

        for _ in 0..2 {
            let (status, _) = send(
                &app,
                "POST",
                &format!("/api/v1/chores/{chore_id}/claim"),
                t,
                Some(json!({ "member_id": alice_id })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, member) = send(&app, "GET", &format!("/api/v1/members/{alice_id}"), t, None).await;
        assert_eq!(member["points"], 100);
        assert_eq!(member["chore"][0]["count"], 2);
        assert_eq!(member["chore"][0]["date"].as_array().unwrap().len(), 2);

        let (_, relation) = send(
            &app,
            "GET",
            &format!("/api/v1/chores/{chore_id}/relation"),
            t,
            None,
        )
        .await;
        assert_eq!(relation["is_related"], true);

        let (status, _) = send(&app, "DELETE", &format!("/api/v1/chores/{chore_id}"), t, None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, active) = send(&app, "GET", "/api/v1/chores", t, None).await;
        assert_eq!(active, json!([]));
        let (_, removed) = send(&app, "GET", "/api/v1/chores/removed", t, None).await;
        assert_eq!(removed[0]["id"], chore_id);

        let (status, report) = send(
            &app,
            "DELETE",
            &format!("/api/v1/chores/{chore_id}/permanent"),
            t,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["reversals"][0]["points_delta"], -100);

        let (_, member) = send(&app, "GET", &format!("/api/v1/members/{alice_id}"), t, None).await;
        assert_eq!(member["points"], 0);
        assert_eq!(member["chore"], json!([]));
    }

    #[tokio::test]
    async fn test_redeem_without_enough_points_conflicts() {
        let app = app();
        let t = token("user_family");
        let t = Some(t.as_str());

        let (_, member) = send(
            &app,
            "POST",
            "/api/v1/members",
            t,
            Some(json!({ "name": "Sam", "role": "son", "points": 150 })),
        )
        .await;
        let (_, reward) = send(
            &app,
            "POST",
            "/api/v1/rewards",
            t,
            Some(json!({ "name": "Toy", "description": "Lego set", "points": 200 })),
        )
        .await;
        assert_eq!(reward["description"], "Lego set");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/rewards/{}/redeem", reward["id"]),
            t,
            Some(json!({ "member_id": member["id"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_POINTS");

        let (_, after) = send(
            &app,
            "GET",
            &format!("/api/v1/members/{}", member["id"]),
            t,
            None,
        )
        .await;
        assert_eq!(after["points"], 150);
    }

    #[tokio::test]
    async fn test_chores_have_no_redeem_route() {
        let app = app();
        let t = token("user_family");
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/chores/1/redeem",
            Some(&t),
            Some(json!({ "member_id": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deduction_routes_round_trip() {
        let app = app();
        let t = token("user_family");
        let t = Some(t.as_str());

        let (_, member) = send(
            &app,
            "POST",
            "/api/v1/members",
            t,
            Some(json!({ "name": "Bob", "points": 20 })),
        )
        .await;
        let id = member["id"].as_i64().unwrap();

        let (status, deducted) = send(
            &app,
            "POST",
            &format!("/api/v1/members/{id}/deductions"),
            t,
            Some(json!({ "points": 5, "reason": "late for dinner" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deducted["points"], 15);
        let deduction_id = deducted["points_deducted"][0]["id"].as_str().unwrap().to_string();

        let (status, restored) = send(
            &app,
            "DELETE",
            &format!("/api/v1/members/{id}/deductions/{deduction_id}"),
            t,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(restored["points"], 20);
        assert_eq!(restored["points_deducted"], json!([]));
    }

    #[tokio::test]
    async fn test_owners_cannot_see_each_other() {
        let app = app();
        let mine = token("user_a");
        let theirs = token("user_b");

        let (_, member) = send(
            &app,
            "POST",
            "/api/v1/members",
            Some(&mine),
            Some(json!({ "name": "Alice" })),
        )
        .await;

        let (_, listed) = send(&app, "GET", "/api/v1/members", Some(&theirs), None).await;
        assert_eq!(listed, json!([]));

        let (status, body) = send(
            &app,
            "DELETE",
            &format!("/api/v1/members/{}", member["id"]),
            Some(&theirs),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_validation_errors_map_to_bad_request() {
        let app = app();
        let t = token("user_family");
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/chores",
            Some(&t),
            Some(json!({ "name": "Dishes", "points": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_missing_body_field_is_a_validation_error() {
        let app = app();
        let t = token("user_family");
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/chores",
            Some(&t),
            Some(json!({ "points": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unparseable_path_ids_are_validation_errors() {
        let app = app();
        let t = token("user_family");

        let (status, body) = send(&app, "GET", "/api/v1/members/abc", Some(&t), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            "DELETE",
            "/api/v1/members/1/deductions/not-a-uuid",
            Some(&t),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_huge_initial_allotment_is_rejected_cleanly() {
        let app = app();
        let t = token("user_family");
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/members",
            Some(&t),
            Some(json!({ "name": "Rich", "points": i64::MAX })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
