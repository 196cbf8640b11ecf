//! 可观测性模块集成测试
//!
//! 测试指标记录函数、配置与资源守卫在未初始化 recorder 时的行为。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use rewards_shared::observability::metrics::{
        get_handle, record_compensation, record_redemption, record_scan_settlement,
        record_status_transition,
    };

    #[test]
    fn test_record_redemption() {
        record_redemption("purchase", "success", 0.05);
        record_redemption("purchase", "insufficient_balance", 0.01);
        record_redemption("cart_checkout", "out_of_stock", 0.02);
        record_redemption("cart_checkout", "duplicate", 0.03);
    }

    #[test]
    fn test_record_compensation() {
        record_compensation("balance", true);
        record_compensation("balance", false);
        record_compensation("stock", true);
    }

    #[test]
    fn test_record_scan_settlement() {
        record_scan_settlement("success", false);
        record_scan_settlement("success", true);
        record_scan_settlement("unrecognized", false);
        record_scan_settlement("user_not_found", false);
    }

    #[test]
    fn test_record_status_transition() {
        record_status_transition("PENDING", "APPROVED");
        record_status_transition("APPROVED", "SHIPPED");
        record_status_transition("PENDING", "REJECTED");
    }

    #[test]
    fn test_metrics_with_edge_cases() {
        // 空标签与极端耗时不应 panic
        record_redemption("", "", 0.0);
        record_redemption("purchase", "success", 999.99);
        record_status_transition("", "");
    }

    #[test]
    fn test_handle_absent_without_init() {
        assert!(get_handle().is_none());
    }
}

// ============================================================================
// 配置测试
// ============================================================================

mod config_tests {
    use rewards_shared::observability::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "unknown-service");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(config.metrics_enabled);
        assert!(!config.json_logs);
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_custom_config() {
        let config = ObservabilityConfig {
            service_name: "my-service".to_string(),
            otlp_endpoint: Some("http://localhost:4317".to_string()),
            trace_sample_ratio: 0.1,
            metrics_enabled: false,
            metrics_port: 9091,
            log_level: "debug".to_string(),
            json_logs: true,
        }
        .with_service_name("rewards-engine-service");

        assert_eq!(config.service_name, "rewards-engine-service");
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://localhost:4317"));
        assert!(!config.metrics_enabled);
        assert_eq!(config.metrics_port, 9091);
        assert!(config.json_logs);
    }
}

// ============================================================================
// Guard 测试
// ============================================================================

mod guard_tests {
    use rewards_shared::observability::ObservabilityGuard;

    #[test]
    fn test_empty_guard() {
        // 创建与 drop 空 guard 都不应 panic
        let guard = ObservabilityGuard::empty();
        drop(guard);
    }
}
