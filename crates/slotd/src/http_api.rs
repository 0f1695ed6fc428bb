//! HTTP control API.
//!
//! Translates slot operations into JSON routes. Pool calls can block on file
//! decoding, so every handler runs them on the actix blocking pool.

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, get, post, web};
use serde::Serialize;
use slot_pool::{SlotError, SlotService};
use slot_types::{LoadRequest, VolumeRequest};

use crate::cli::VERSION;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Register every route on an app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_slots)
        .service(stop_all)
        .service(load_slot)
        .service(play_slot)
        .service(stop_slot)
        .service(unload_slot)
        .service(set_volume)
        .service(slot_status)
        .service(keep_alive);
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: VERSION,
    })
}

#[get("/slots")]
async fn list_slots(service: web::Data<SlotService>) -> HttpResponse {
    let service = service.into_inner();
    match web::block(move || service.statuses()).await {
        Ok(statuses) => HttpResponse::Ok().json(statuses),
        Err(err) => blocking_error(err),
    }
}

#[post("/slots/stop-all")]
async fn stop_all(service: web::Data<SlotService>) -> HttpResponse {
    tracing::info!("stop-all request");
    let service = service.into_inner();
    match web::block(move || service.interrupt()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => blocking_error(err),
    }
}

#[post("/slots/{id}/load")]
async fn load_slot(
    service: web::Data<SlotService>,
    path: web::Path<String>,
    body: web::Json<LoadRequest>,
) -> HttpResponse {
    let id = match slot_id(path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let LoadRequest { file_path, looping } = body.into_inner();
    if file_path.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "filePath is required");
    }

    tracing::info!(slot = %id, source = %file_path, looping, "load request");
    let service = service.into_inner();
    match web::block(move || service.load(&id, &file_path, looping)).await {
        Ok(Ok(())) => HttpResponse::NoContent().finish(),
        Ok(Err(err)) => slot_error(err),
        Err(err) => blocking_error(err),
    }
}

#[post("/slots/{id}/play")]
async fn play_slot(service: web::Data<SlotService>, path: web::Path<String>) -> HttpResponse {
    let id = match slot_id(path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let service = service.into_inner();
    match web::block(move || service.play(&id)).await {
        Ok(Ok(())) => HttpResponse::NoContent().finish(),
        Ok(Err(err)) => slot_error(err),
        Err(err) => blocking_error(err),
    }
}

#[post("/slots/{id}/stop")]
async fn stop_slot(service: web::Data<SlotService>, path: web::Path<String>) -> HttpResponse {
    let id = match slot_id(path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let service = service.into_inner();
    let result = web::block(move || {
        let loaded = service.has_slot(&id);
        if !loaded {
            tracing::warn!(slot = %id, "stop requested for slot that is not loaded");
        }
        service.stop(&id);
    })
    .await;
    match result {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => blocking_error(err),
    }
}

#[post("/slots/{id}/unload")]
async fn unload_slot(service: web::Data<SlotService>, path: web::Path<String>) -> HttpResponse {
    let id = match slot_id(path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let service = service.into_inner();
    let result = web::block(move || {
        if !service.has_slot(&id) {
            tracing::warn!(slot = %id, "unload requested for slot that is not loaded");
        }
        service.unload(&id);
    })
    .await;
    match result {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => blocking_error(err),
    }
}

#[post("/slots/{id}/volume")]
async fn set_volume(
    service: web::Data<SlotService>,
    path: web::Path<String>,
    body: web::Json<VolumeRequest>,
) -> HttpResponse {
    let id = match slot_id(path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let volume = body.volume;
    let service = service.into_inner();
    let result = web::block(move || {
        if !service.has_slot(&id) {
            return Err(SlotError::NotLoaded(id));
        }
        service.set_volume(&id, volume);
        Ok(())
    })
    .await;
    match result {
        Ok(Ok(())) => HttpResponse::NoContent().finish(),
        Ok(Err(err)) => slot_error(err),
        Err(err) => blocking_error(err),
    }
}

#[get("/slots/{id}/status")]
async fn slot_status(service: web::Data<SlotService>, path: web::Path<String>) -> HttpResponse {
    let id = match slot_id(path.into_inner()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let service = service.into_inner();
    match web::block(move || service.status(&id)).await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(err) => blocking_error(err),
    }
}

#[get("/keep-alive")]
async fn keep_alive(service: web::Data<SlotService>) -> HttpResponse {
    let service = service.into_inner();
    match web::block(move || service.keep_alive_status()).await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(err) => blocking_error(err),
    }
}

fn slot_id(raw: String) -> Result<String, HttpResponse> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "slot id is required"));
    }
    Ok(id.to_string())
}

fn status_for(err: &SlotError) -> StatusCode {
    match err {
        SlotError::InvalidSource { .. } => StatusCode::BAD_REQUEST,
        SlotError::CapacityExceeded { .. } => StatusCode::CONFLICT,
        SlotError::NotLoaded(_) => StatusCode::NOT_FOUND,
    }
}

fn slot_error(err: SlotError) -> HttpResponse {
    let status = status_for(&err);
    tracing::warn!(status = status.as_u16(), error = %err, "slot request rejected");
    error_response(status, &err.to_string())
}

fn blocking_error(err: BlockingError) -> HttpResponse {
    tracing::error!(error = %err, "blocking pool unavailable");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "slot service unavailable")
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use actix_web::{App, test};
    use slot_pool::testing::{FakeEngineFactory, FakeKeepAlive, InMemoryResolver};
    use slot_pool::{KeepAliveState, KeepAliveStatus, LifecycleController, SlotPool, SlotStatus};

    fn service() -> web::Data<SlotService> {
        let pool = SlotPool::new(
            InMemoryResolver::with_sources(["a.wav", "b.wav", "c.wav", "d.wav", "e.wav", "f.wav"]),
            Arc::new(FakeEngineFactory::new(4_000)),
        );
        let lifecycle = LifecycleController::new(FakeKeepAlive::new());
        web::Data::new(SlotService::new(pool, lifecycle))
    }

    fn load_body(file_path: &str, looping: bool) -> serde_json::Value {
        serde_json::json!({ "filePath": file_path, "loop": looping })
    }

    #[actix_web::test]
    async fn load_play_status_round_trip() {
        let data = service();
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/slots/rain/load")
            .set_json(load_body("a.wav", true))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::post().uri("/slots/rain/play").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get().uri("/slots/rain/status").to_request();
        let status: SlotStatus = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status.id, "rain");
        assert!(status.is_playing);
        assert_eq!(status.duration_ms, 4_000);

        let req = test::TestRequest::get().uri("/keep-alive").to_request();
        let ka: KeepAliveStatus = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ka.state, KeepAliveState::Running);
        assert_eq!(ka.slots_loaded, 1);
    }

    #[actix_web::test]
    async fn unknown_slot_status_is_zero_valued() {
        let app = test::init_service(App::new().app_data(service()).configure(configure)).await;
        let req = test::TestRequest::get().uri("/slots/ghost/status").to_request();
        let status: SlotStatus = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status, SlotStatus::absent("ghost"));
    }

    #[actix_web::test]
    async fn play_unknown_slot_is_404_with_message() {
        let app = test::init_service(App::new().app_data(service()).configure(configure)).await;
        let req = test::TestRequest::post().uri("/slots/ghost/play").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "slot 'ghost' not preloaded");
    }

    #[actix_web::test]
    async fn missing_file_is_400() {
        let app = test::init_service(App::new().app_data(service()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/slots/a/load")
            .set_json(load_body("missing.wav", false))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn blank_file_path_is_400() {
        let app = test::init_service(App::new().app_data(service()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/slots/a/load")
            .set_json(load_body("  ", false))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn sixth_slot_is_409() {
        let app = test::init_service(App::new().app_data(service()).configure(configure)).await;
        for (i, file) in ["a.wav", "b.wav", "c.wav", "d.wav", "e.wav"].iter().enumerate() {
            let req = test::TestRequest::post()
                .uri(&format!("/slots/s{i}/load"))
                .set_json(load_body(file, false))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        }
        let req = test::TestRequest::post()
            .uri("/slots/s5/load")
            .set_json(load_body("f.wav", false))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/slots").to_request();
        let all: Vec<SlotStatus> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, "s0");
    }

    #[actix_web::test]
    async fn stop_and_unload_of_unknown_slot_succeed() {
        let app = test::init_service(App::new().app_data(service()).configure(configure)).await;
        for uri in ["/slots/ghost/stop", "/slots/ghost/unload"] {
            let req = test::TestRequest::post().uri(uri).to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        }
    }

    #[actix_web::test]
    async fn volume_requires_loaded_slot_and_clamps() {
        let data = service();
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/slots/a/volume")
            .set_json(serde_json::json!({ "volume": 0.5 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        data.load("a", "a.wav", false).unwrap();
        let req = test::TestRequest::post()
            .uri("/slots/a/volume")
            .set_json(serde_json::json!({ "volume": 1.7 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        assert_eq!(data.status("a").volume, 1.0);
    }

    #[actix_web::test]
    async fn stop_all_silences_and_drops_keep_alive() {
        let data = service();
        data.load("a", "a.wav", true).unwrap();
        data.play("a").unwrap();
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post().uri("/slots/stop-all").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        assert!(!data.pool().any_playing());
        assert!(data.has_slot("a"));
        assert_eq!(data.keep_alive_state(), KeepAliveState::Stopped);
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], VERSION);
    }

    #[::core::prelude::v1::test]
    fn errors_map_to_statuses() {
        assert_eq!(
            status_for(&SlotError::CapacityExceeded { max: 5 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&SlotError::NotLoaded("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&SlotError::InvalidSource {
                uri: "x".to_string(),
                reason: "gone".to_string()
            }),
            StatusCode::BAD_REQUEST
        );
    }
}
