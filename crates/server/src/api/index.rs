use axum::{extract::State, Json};

use crate::state::{AppState, IndexStatus, IndexStatusResponse};

pub async fn get_status(State(state): State<AppState>) -> Json<IndexStatusResponse> {
    let status = state.index_status.read().clone();
    let mut response = status_response(status);
    let schedule = state.config.index_schedule.trim();
    if !schedule.is_empty() {
        response.schedule = Some(schedule.to_string());
    }
    Json(response)
}

fn status_response(status: IndexStatus) -> IndexStatusResponse {
    let mut response = IndexStatusResponse {
        status: "idle",
        at: None,
        report: None,
        holder: None,
        message: None,
        schedule: None,
    };
    match status {
        IndexStatus::Idle => {}
        IndexStatus::Running { started } => {
            response.status = "running";
            response.at = Some(started);
        }
        IndexStatus::Completed { finished, report } => {
            response.status = "completed";
            response.at = Some(finished);
            response.report = Some(report);
        }
        IndexStatus::Skipped { at, holder } => {
            response.status = "skipped";
            response.at = Some(at);
            response.holder = holder;
        }
        IndexStatus::Failed { at, message } => {
            response.status = "failed";
            response.at = Some(at);
            response.message = Some(message);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use library::IndexReport;

    #[test]
    fn idle_has_no_details() {
        let value = serde_json::to_value(status_response(IndexStatus::Idle)).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "idle" }));
    }

    #[test]
    fn completed_carries_report() {
        let report = IndexReport {
            folders: 2,
            audio_files: 5,
            ..IndexReport::default()
        };
        let response = status_response(IndexStatus::Completed {
            finished: Utc::now(),
            report: report.clone(),
        });
        assert_eq!(response.status, "completed");
        assert_eq!(response.report, Some(report));
        assert!(response.at.is_some());
    }

    #[tokio::test]
    async fn status_follows_reindex() {
        let app = crate::api::test_support::app(|_| {});
        let Json(idle) = get_status(State(app.state.clone())).await;
        assert_eq!(idle.status, "idle");
        assert_eq!(idle.schedule, None);

        crate::scan::run_reindex(app.state.clone()).await;
        let Json(done) = get_status(State(app.state.clone())).await;
        assert_eq!(done.status, "completed");
        assert!(done.report.is_some());
    }

    #[test]
    fn failure_keeps_message() {
        let response = status_response(IndexStatus::Failed {
            at: Utc::now(),
            message: "disk gone".to_string(),
        });
        assert_eq!(response.status, "failed");
        assert_eq!(response.message.as_deref(), Some("disk gone"));
    }
}
