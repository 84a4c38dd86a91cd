//! Integration tests for events

#[cfg(test)]
mod tests {
    use srcforge_errors::BuildError;
    use srcforge_events::*;
    use srcforge_types::{BuildStage, BuildSystemKind};

    #[tokio::test]
    async fn test_event_sender_emit_helpers() {
        let (tx, mut rx) = channel();

        tx.emit_operation_started("detect");
        tx.emit_debug("test debug");
        tx.emit_operation_failed("detect", "no build system");

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(
            event1,
            AppEvent::General(GeneralEvent::OperationStarted { ref operation }) if operation == "detect"
        ));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(event2, AppEvent::General(GeneralEvent::DebugLog { .. })));

        let event3 = rx.recv().await.unwrap();
        assert_eq!(event3.log_level(), tracing::Level::ERROR);
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[tokio::test]
    async fn test_optional_sender_is_silent_when_absent() {
        let none: Option<EventSender> = None;
        none.emit_notice("nobody listens");

        let (tx, mut rx) = channel();
        Some(tx).emit_notice("hello");
        assert!(matches!(
            rx.recv().await,
            Some(AppEvent::General(GeneralEvent::Notice { .. }))
        ));
    }

    #[test]
    fn test_build_event_serialization() {
        let event = AppEvent::Build(BuildEvent::BuildSystemDetected {
            session_id: "s1".into(),
            kind: BuildSystemKind::CMake,
            forced: false,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "build");
        assert_eq!(json["event"]["type"], "BuildSystemDetected");
        assert_eq!(json["event"]["kind"], "cmake");
    }

    #[test]
    fn test_log_levels() {
        let failure = FailureContext::from_error(&BuildError::CompilationFailed {
            message: "boom".into(),
        });
        assert!(failure.retryable);
        let failed = AppEvent::Build(BuildEvent::Failed {
            session_id: "s1".into(),
            stage: BuildStage::Compilation,
            failure,
        });
        assert_eq!(failed.log_level(), tracing::Level::ERROR);
        assert_eq!(failed.log_target(), "srcforge::events::build");

        let line = AppEvent::Build(BuildEvent::StepOutput {
            session_id: "s1".into(),
            line: "CC foo.o".into(),
            is_stderr: false,
        });
        assert_eq!(line.log_level(), tracing::Level::TRACE);
    }
}
