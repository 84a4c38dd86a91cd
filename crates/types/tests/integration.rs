//! Integration tests for types

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use srcforge_types::*;

    fn any_stage() -> impl Strategy<Value = BuildStage> {
        prop_oneof![
            Just(BuildStage::Extraction),
            Just(BuildStage::Detection),
            Just(BuildStage::Configuration),
            Just(BuildStage::DependencyResolution),
            Just(BuildStage::Compilation),
            Just(BuildStage::Testing),
            Just(BuildStage::Installation),
            Just(BuildStage::DesktopIntegration),
            Just(BuildStage::Complete),
            Just(BuildStage::Failed),
            Just(BuildStage::Cancelled),
        ]
    }

    proptest! {
        #[test]
        fn failure_states_reachable_from_every_live_stage(stage in any_stage()) {
            prop_assert_eq!(
                stage.can_transition_to(BuildStage::Failed),
                !stage.is_terminal()
            );
            prop_assert_eq!(
                stage.can_transition_to(BuildStage::Cancelled),
                !stage.is_terminal()
            );
        }

        #[test]
        fn terminal_stages_have_no_successor(from in any_stage(), to in any_stage()) {
            if from.is_terminal() {
                prop_assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_build_system_kind_names() {
        assert_eq!(BuildSystemKind::from_name("CMAKE"), Some(BuildSystemKind::CMake));
        assert_eq!(
            BuildSystemKind::from_name("plain makefile"),
            Some(BuildSystemKind::PlainMakefile)
        );
        assert_eq!(BuildSystemKind::from_name("make"), Some(BuildSystemKind::PlainMakefile));
        assert_eq!(BuildSystemKind::from_name("scons"), None);
        assert_eq!(BuildSystemKind::Autotools.to_string(), "GNU Autotools");
    }

    #[test]
    fn test_detection_order_is_fixed() {
        assert_eq!(
            BuildSystemKind::DETECTION_ORDER,
            [
                BuildSystemKind::Autotools,
                BuildSystemKind::CMake,
                BuildSystemKind::Meson,
                BuildSystemKind::PlainMakefile,
            ]
        );
    }

    #[test]
    fn test_install_location_prefix() {
        assert_eq!(
            InstallLocation::SystemWide.prefix(),
            std::path::PathBuf::from("/usr/local")
        );
        assert!(InstallLocation::UserLocal.prefix().ends_with(".local"));
        assert!(InstallLocation::SystemWide.requires_elevation());
        assert!(!InstallLocation::UserLocal.requires_elevation());
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&BuildStage::DependencyResolution).unwrap();
        assert_eq!(json, r#""dependency_resolution""#);
    }
}
