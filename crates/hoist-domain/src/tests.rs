#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::*;

    #[test]
    fn version_parses_strict_triples() {
        let v = ModuleVersion::parse("1.2.3").unwrap();
        assert_eq!(v, ModuleVersion::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn version_rejects_malformed_input() {
        assert!(ModuleVersion::parse("1.2").is_err());
        assert!(ModuleVersion::parse("1.2.3.4").is_err());
        assert!(ModuleVersion::parse("1.2.x").is_err());
        assert!(ModuleVersion::parse("").is_err());
        assert!(ModuleVersion::parse("1.2.3-rc1").is_err());
    }

    #[test]
    fn version_ordering_is_semantic() {
        assert!(ModuleVersion::new(2, 0, 0) > ModuleVersion::new(1, 9, 9));
        assert!(ModuleVersion::new(1, 10, 0) > ModuleVersion::new(1, 9, 9));
    }

    #[test]
    fn module_rejects_empty_name() {
        assert!(Module::new("", ModuleVersion::new(1, 0, 0)).is_err());
        assert!(Module::new("  ", ModuleVersion::new(1, 0, 0)).is_err());
        assert!(Module::new("billing", ModuleVersion::new(1, 0, 0)).is_ok());
    }

    #[test]
    fn priority_tier_matrix() {
        let mut msg = Message::new(TopicName::new("t").unwrap(), "{}", 7).unwrap();
        assert!(msg.is_high_priority());
        assert!(!msg.is_low_priority());

        msg.priority = 3;
        assert!(msg.is_low_priority());
        assert!(!msg.is_high_priority());

        msg.priority = 5;
        assert!(!msg.is_high_priority());
        assert!(!msg.is_low_priority());
    }

    #[test]
    fn priority_out_of_range_rejected() {
        assert!(Message::new(TopicName::new("t").unwrap(), "{}", 10).is_err());
        assert!(Message::new(TopicName::new("t").unwrap(), "{}", 9).is_ok());
    }

    #[test]
    fn idempotency_key_prefers_header() {
        let mut msg = Message::new(TopicName::new("t").unwrap(), "{}", 0).unwrap();
        assert_eq!(msg.idempotency_key(), msg.message_id.to_string());

        msg.headers
            .insert(IDEMPOTENCY_KEY_HEADER.to_string(), "order-42".to_string());
        assert_eq!(msg.idempotency_key(), "order-42");

        // Blank header falls back to the message id
        msg.headers
            .insert(IDEMPOTENCY_KEY_HEADER.to_string(), "  ".to_string());
        assert_eq!(msg.idempotency_key(), msg.message_id.to_string());
    }

    #[test]
    fn dlq_topic_naming() {
        let t = TopicName::new("orders").unwrap();
        assert_eq!(t.dlq().as_str(), "orders.dlq");
        assert!(t.dlq().is_dlq());
        assert!(!t.is_dlq());
    }

    #[test]
    fn empty_topic_name_rejected() {
        assert!(TopicName::new("").is_err());
        assert!(TopicName::new("   ").is_err());
    }

    #[test]
    fn topic_partition_bounds() {
        let mut topic = Topic::new(TopicName::new("t").unwrap(), TopicType::Queue);
        assert!(topic.validate().is_ok());

        topic.partition_count = 0;
        assert!(topic.validate().is_err());
        topic.partition_count = 17;
        assert!(topic.validate().is_err());
        topic.partition_count = 16;
        assert!(topic.validate().is_ok());
    }

    #[test]
    fn subscription_filter_matrix() {
        let topic = TopicName::new("t").unwrap();
        let mut sub = Subscription::new(topic, "group-a", "http://consumer/a");

        let mut headers = HashMap::new();
        headers.insert("region".to_string(), "eu".to_string());

        // No filter accepts everything
        assert!(sub.accepts(&headers));

        // Empty filter accepts everything
        sub.filter = Some(SubscriptionFilter::default());
        assert!(sub.accepts(&headers));

        // Exact match required for every configured key
        let mut matches = HashMap::new();
        matches.insert("region".to_string(), "eu".to_string());
        sub.filter = Some(SubscriptionFilter { header_matches: matches.clone() });
        assert!(sub.accepts(&headers));

        matches.insert("tier".to_string(), "gold".to_string());
        sub.filter = Some(SubscriptionFilter { header_matches: matches });
        assert!(!sub.accepts(&headers), "missing header must not match");

        headers.insert("tier".to_string(), "silver".to_string());
        let sub_filter = sub.filter.as_ref().unwrap();
        assert!(!sub_filter.matches(&headers), "wrong value must not match");
    }

    #[test]
    fn environment_and_strategy_parse_round_trip() {
        for env in [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
        ] {
            assert_eq!(Environment::parse(&env.to_string()).unwrap(), env);
        }
        for kind in [
            StrategyKind::BlueGreen,
            StrategyKind::Rolling,
            StrategyKind::Canary,
            StrategyKind::Direct,
        ] {
            assert_eq!(StrategyKind::parse(&kind.to_string()).unwrap(), kind);
        }
        assert!(Environment::parse("qa").is_err());
        assert!(StrategyKind::parse("bluegreen").is_err());
    }
}
