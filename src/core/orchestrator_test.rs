//! Orchestrator unit tests
//!
//! Exercise task creation, cancel/pause/resume semantics, dismissal tracking
//! and the local-file duplicate check against a scripted mock gateway.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::super::config::AppConfig;
    use super::super::gateway::{BackendGateway, CancelOutcome, GatewayError};
    use super::super::models::{AppError, FirmwareVariant, LocalFile, TaskStatus};
    use super::super::orchestrator::{
        EventReceiver, NoticeSeverity, RescueCenter, RescueEvent, StartOutcome,
    };
    use super::super::testing::MockGateway;

    fn variant(name: &str, url: &str) -> FirmwareVariant {
        FirmwareVariant {
            name: name.to_string(),
            url: url.to_string(),
            match_id: "m1".to_string(),
            ..Default::default()
        }
    }

    fn local_file(file_name: &str, modified_at: i64) -> LocalFile {
        LocalFile {
            file_name: file_name.to_string(),
            full_path: format!("/downloads/{}", file_name),
            modified_at,
            ..Default::default()
        }
    }

    fn center_with(gateway: Arc<MockGateway>, config: &AppConfig) -> RescueCenter {
        RescueCenter::new(gateway as Arc<dyn BackendGateway>, config)
    }

    fn center(gateway: Arc<MockGateway>) -> RescueCenter {
        center_with(gateway, &AppConfig::default())
    }

    fn drain(receiver: &mut EventReceiver) -> Vec<RescueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn start_download_creates_task_and_merges_response() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        let outcome = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap();
        let task_id = match outcome {
            StartOutcome::Started { task_id } => task_id,
            other => panic!("unexpected outcome: {:?}", other),
        };

        let history = center.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, task_id);
        assert_eq!(history[0].status, TaskStatus::Downloading);
        assert_eq!(center.current_task().await.id, task_id);
        assert_eq!(gateway.call_count("start_download"), 1);
    }

    #[tokio::test]
    async fn start_download_skips_already_downloaded_package() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_local_files(vec![local_file("rom_a.zip", 200)]);
        let center = center(gateway.clone());

        let outcome = center
            .start_download(&variant("ROM_A.zip", "https://x/ROM_A.zip"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StartOutcome::AlreadyDownloaded {
                file_name: "rom_a.zip".to_string()
            }
        );
        assert!(center.history().await.is_empty());
        assert_eq!(gateway.call_count("start_download"), 0);
    }

    #[tokio::test]
    async fn start_download_rejects_empty_url() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        let err = center
            .start_download(&variant("rom.zip", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(center.history().await.is_empty());
        assert_eq!(gateway.call_count("start_download"), 0);
    }

    #[tokio::test]
    async fn cancel_not_found_resolves_to_canceled() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_cancel(Ok(CancelOutcome::NotFound));
        let center = center(gateway.clone());

        let StartOutcome::Started { task_id } = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };

        center.cancel_task(&task_id).await.unwrap();
        let history = center.history().await;
        assert_eq!(history[0].status, TaskStatus::Canceled);
        assert!(history[0].last_error.is_empty());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_while_canceling() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_cancel(Ok(CancelOutcome::Canceling));
        let center = center(gateway.clone());

        let StartOutcome::Started { task_id } = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };

        center.cancel_task(&task_id).await.unwrap();
        assert_eq!(center.history().await[0].status, TaskStatus::Canceling);
        assert_eq!(gateway.call_count("cancel_task"), 1);

        // Second request must not issue another RPC.
        center.cancel_task(&task_id).await.unwrap();
        assert_eq!(gateway.call_count("cancel_task"), 1);
        assert_eq!(center.history().await[0].status, TaskStatus::Canceling);
    }

    #[tokio::test]
    async fn cancel_rpc_failure_marks_task_failed() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_cancel(Err(GatewayError::backend("device unreachable")));
        let center = center(gateway.clone());

        let StartOutcome::Started { task_id } = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };

        center.cancel_task(&task_id).await.unwrap();
        let history = center.history().await;
        assert_eq!(history[0].status, TaskStatus::Failed);
        assert_eq!(history[0].last_error, "device unreachable");
    }

    #[tokio::test]
    async fn cancel_is_noop_for_terminal_and_unknown_tasks() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        let StartOutcome::Started { task_id } = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };
        center
            .handle_progress_event(&json!({"taskId": task_id, "status": "completed"}))
            .await;

        center.cancel_task(&task_id).await.unwrap();
        center.cancel_task("no-such-task").await.unwrap();
        assert_eq!(gateway.call_count("cancel_task"), 0);
        assert_eq!(center.history().await[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn pause_failure_keeps_status_and_notifies() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_pause(Err(GatewayError::backend("pause not supported")));
        let center = center(gateway.clone());
        let mut events = center.subscribe().await;

        let StartOutcome::Started { task_id } = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };
        drain(&mut events);

        center.pause_task(&task_id).await.unwrap();
        assert_eq!(center.history().await[0].status, TaskStatus::Downloading);

        let notices: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|event| {
                matches!(
                    event,
                    RescueEvent::Notice {
                        severity: NoticeSeverity::Error,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(notices.len(), 1);
    }

    #[tokio::test]
    async fn resume_response_status_is_applied() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_resume(Ok(super::super::gateway::ResumeResponse {
            status: Some(TaskStatus::Downloading),
        }));
        let center = center(gateway.clone());

        let StartOutcome::Started { task_id } = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };
        center
            .handle_progress_event(&json!({"taskId": task_id, "status": "paused"}))
            .await;
        assert_eq!(center.history().await[0].status, TaskStatus::Paused);

        center.resume_task(&task_id).await.unwrap();
        assert_eq!(center.history().await[0].status, TaskStatus::Downloading);
    }

    #[tokio::test]
    async fn pause_and_resume_are_noops_for_unknown_tasks() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        center.pause_task("ghost").await.unwrap();
        center.resume_task("ghost").await.unwrap();
        assert_eq!(gateway.call_count("pause_task"), 0);
        assert_eq!(gateway.call_count("resume_task"), 0);
    }

    #[tokio::test]
    async fn dismiss_resets_current_and_cancels_backend_work() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        let StartOutcome::Started { task_id } = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };

        center.dismiss_task(&task_id).await;
        assert!(center.history().await.is_empty());
        assert_eq!(center.current_task().await.status, TaskStatus::Idle);

        // The best-effort cancel is spawned, give it a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gateway.call_count("cancel_task"), 1);
    }

    #[tokio::test]
    async fn dismissed_id_drops_events_until_terminal_release() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        let StartOutcome::Started { task_id } = center
            .start_download(&variant("rom.zip", "https://x/rom.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };
        center.dismiss_task(&task_id).await;

        // Non-terminal events stay dropped.
        center
            .handle_progress_event(&json!({"taskId": task_id, "status": "downloading"}))
            .await;
        assert!(center.history().await.is_empty());

        // A terminal event releases the dismissal but must not resurrect
        // a history entry.
        center
            .handle_progress_event(&json!({"taskId": task_id, "status": "completed"}))
            .await;
        assert!(center.history().await.is_empty());

        // The id is free again: a later event tracks as a fresh record.
        center
            .handle_progress_event(&json!({"taskId": task_id, "status": "downloading"}))
            .await;
        assert_eq!(center.history().await.len(), 1);
        assert_eq!(center.history().await[0].status, TaskStatus::Downloading);
    }

    #[tokio::test]
    async fn dismiss_all_clears_history() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        for i in 0..3 {
            center
                .start_download(&variant(
                    &format!("rom{}.zip", i),
                    &format!("https://x/rom{}.zip", i),
                ))
                .await
                .unwrap();
        }
        assert_eq!(center.history().await.len(), 3);

        center.dismiss_all().await;
        assert!(center.history().await.is_empty());
    }

    #[tokio::test]
    async fn history_limit_drops_oldest_terminal_entries() {
        let gateway = Arc::new(MockGateway::new());
        let mut config = AppConfig::default();
        config.history.max_entries = Some(2);
        let center = center_with(gateway.clone(), &config);

        let StartOutcome::Started { task_id: first } = center
            .start_download(&variant("rom0.zip", "https://x/rom0.zip"))
            .await
            .unwrap()
        else {
            panic!("expected start");
        };
        center
            .handle_progress_event(&json!({"taskId": first, "status": "completed"}))
            .await;

        center
            .start_download(&variant("rom1.zip", "https://x/rom1.zip"))
            .await
            .unwrap();
        center
            .start_download(&variant("rom2.zip", "https://x/rom2.zip"))
            .await
            .unwrap();

        let history = center.history().await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|task| task.id != first));
    }

    #[tokio::test]
    async fn progress_event_for_unknown_task_creates_transient_record() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        center
            .handle_progress_event(&json!({
                "taskId": "out-of-band",
                "status": "downloading",
                "bytesDownloaded": 10u64
            }))
            .await;

        let history = center.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "out-of-band");
        assert_eq!(history[0].downloaded_bytes, 10);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped_silently() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());

        center.handle_progress_event(&json!("not an object")).await;
        center.handle_progress_event(&json!({"status": "warp"})).await;
        center
            .handle_progress_event(&json!({"status": "downloading"}))
            .await; // no task id
        assert!(center.history().await.is_empty());
    }

    #[tokio::test]
    async fn local_file_housekeeping_refreshes_projection() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());
        let file = local_file("rom.zip", 100);

        gateway.set_local_files(vec![file.clone()]);
        center.extract_local_file(&file).await.unwrap();
        assert_eq!(center.local_files().await.len(), 1);

        gateway.set_local_files(Vec::new());
        center.delete_local_file(&file).await.unwrap();
        assert!(center.local_files().await.is_empty());
        assert_eq!(gateway.call_count("extract_local_file"), 1);
        assert_eq!(gateway.call_count("delete_local_file"), 1);
    }

    #[tokio::test]
    async fn attach_recipe_requires_recipe_url() {
        let gateway = Arc::new(MockGateway::new());
        let center = center(gateway.clone());
        let file = local_file("rom.zip", 100);

        let bare = variant("rom.zip", "https://x/rom.zip");
        assert!(matches!(
            center.attach_recipe(&file, &bare).await,
            Err(AppError::InvalidInput(_))
        ));

        let mut with_recipe = bare.clone();
        with_recipe.recipe_url = Some("https://x/recipe.json".to_string());
        center.attach_recipe(&file, &with_recipe).await.unwrap();
        assert_eq!(gateway.call_count("attach_recipe"), 1);
    }
}
