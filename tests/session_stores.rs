mod fixture;

use std::collections::HashMap;

use assert_matches::assert_matches;
use fixture::{config, inserted, open_store, reread, MODES};
use pretty_assertions::assert_eq;
use serde_json::json;
use session_cache::{
    AttributeValue, BackedSession, CacheStoreError, MemoryCacheManager,
    HTTP_SESSION_BINDING_LISTENER,
};

#[test]
fn duplicate_insert_is_rejected() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let session = inserted(store.as_ref(), "s1", 1_000, 60);
        assert!(!session.is_new());

        let mut again = BackedSession::new("s1", 2_000, 60);
        assert_matches!(
            store.insert_session(&mut again),
            Err(CacheStoreError::DuplicateSession { ref id }) if id == "s1",
            "{mode:?}"
        );
        assert!(store.is_present("s1").expect("lookup"), "{mode:?}");
        assert!(!store.is_present("s2").expect("lookup"), "{mode:?}");
    }
}

#[test]
fn metadata_round_trips_through_the_store() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = BackedSession::new("s1", 1_000, 1_800);
        session.set_user_name(Some("alice".to_owned()));
        session.set_listener_flag(HTTP_SESSION_BINDING_LISTENER);
        store.insert_session(&mut session).expect("insert");
        assert!(!session.has_metadata_hit(), "{mode:?}");
        assert_eq!(session.last_write_last_access_time(), 1_000);

        let restored = reread(store.as_ref(), "s1");
        assert_eq!(restored.creation_time(), 1_000);
        assert_eq!(restored.current_access_time(), 1_000);
        assert_eq!(restored.max_inactive_interval(), 1_800);
        assert_eq!(restored.user_name(), Some("alice"));
        assert!(restored.has_binding_listener());
        assert!(!restored.is_new());
        assert!(store.read_from_external("missing").expect("read").is_none());
    }
}

#[test]
fn attributes_persist_and_load() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.set_attribute("count", AttributeValue::Integer(42));
        session.set_attribute("cart", AttributeValue::Object(json!({"sku": "A-1", "qty": 2})));
        session.set_attribute("token", AttributeValue::ByteArray(vec![9, 8, 7]));
        assert!(store.persist_session(&mut session, true).expect("persist"));
        assert!(!session.has_property_hit(), "{mode:?}");

        let fresh = reread(store.as_ref(), "s1");
        assert_eq!(
            store.load_one_value("count", &fresh).expect("load"),
            Some(AttributeValue::Integer(42))
        );
        assert_eq!(store.load_one_value("absent", &fresh).expect("load"), None);

        let values = store.get_all_values(&fresh).expect("values");
        assert_eq!(
            values,
            HashMap::from([
                ("count".to_owned(), AttributeValue::Integer(42)),
                (
                    "cart".to_owned(),
                    AttributeValue::Object(json!({"sku": "A-1", "qty": 2}))
                ),
                ("token".to_owned(), AttributeValue::ByteArray(vec![9, 8, 7])),
            ])
        );

        let mut populated = reread(store.as_ref(), "s1");
        populated.load_attributes(values);
        assert_eq!(store.load_one_value("count", &populated).expect("load"), None);
    }
}

#[test]
fn removed_attributes_disappear() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.set_attribute("a", AttributeValue::Long(1));
        session.set_attribute("b", AttributeValue::Long(2));
        store.persist_session(&mut session, true).expect("persist");

        session.remove_attribute("a");
        store.persist_session(&mut session, true).expect("persist");

        let values = store
            .get_all_values(&reread(store.as_ref(), "s1"))
            .expect("values");
        assert_eq!(
            values,
            HashMap::from([("b".to_owned(), AttributeValue::Long(2))]),
            "{mode:?}"
        );
    }
}

#[test]
fn pending_local_changes_are_not_overwritten_by_stored_values() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.set_attribute("a", AttributeValue::Short(1));
        session.set_attribute("b", AttributeValue::Short(2));
        store.persist_session(&mut session, true).expect("persist");

        let mut other = reread(store.as_ref(), "s1");
        other.set_attribute("a", AttributeValue::Short(10));
        other.remove_attribute("b");

        assert!(
            store.get_all_values(&other).expect("values").is_empty(),
            "{mode:?}"
        );
    }
}

#[test]
fn write_all_properties_writes_unchanged_values() {
    for (write_all, expected) in [(true, 2), (false, 1)] {
        for mode in MODES {
            let manager = MemoryCacheManager::new();
            let store = open_store(&manager, config(mode).with_write_all_properties(write_all));
            let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
            session.load_attributes(HashMap::from([(
                "loaded".to_owned(),
                AttributeValue::Boolean(true),
            )]));
            session.set_attribute("changed", AttributeValue::Boolean(false));
            store.persist_session(&mut session, true).expect("persist");

            let values = store
                .get_all_values(&reread(store.as_ref(), "s1"))
                .expect("values");
            assert_eq!(values.len(), expected, "{mode:?} write_all={write_all}");
        }
    }
}

#[test]
fn metadata_changes_are_persisted() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.set_user_name(Some("bob".to_owned()));
        session.set_max_inactive_interval(900);

        assert!(store.persist_session(&mut session, false).expect("persist"));
        assert!(!session.has_metadata_hit());

        let restored = reread(store.as_ref(), "s1");
        assert_eq!(restored.user_name(), Some("bob"), "{mode:?}");
        assert_eq!(restored.max_inactive_interval(), 900, "{mode:?}");
    }
}

#[test]
fn persist_without_changes_writes_nothing() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.update_last_access_time(5_000);

        assert!(store.persist_session(&mut session, false).expect("persist"));
        assert_eq!(reread(store.as_ref(), "s1").current_access_time(), 1_000, "{mode:?}");
    }
}

#[test]
fn persist_records_access_time_without_end_of_service_writes() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode).with_eos_write(false));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.update_last_access_time(5_000);

        assert!(store.persist_session(&mut session, false).expect("persist"));
        assert_eq!(session.last_write_last_access_time(), 5_000);
        assert_eq!(reread(store.as_ref(), "s1").current_access_time(), 5_000, "{mode:?}");
    }
}

#[test]
fn persist_reports_a_vanished_session() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        store.remove_persisted_session("s1").expect("remove");

        session.set_user_name(None);
        assert!(!store.persist_session(&mut session, false).expect("persist"), "{mode:?}");
    }
}

#[test]
fn removing_a_session_drops_its_attributes() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.set_attribute("cart", AttributeValue::Long(7));
        store.persist_session(&mut session, true).expect("persist");

        store.remove_persisted_session("s1").expect("remove");
        assert!(!store.is_present("s1").expect("lookup"));

        let reborn = inserted(store.as_ref(), "s1", 2_000, 60);
        assert_eq!(store.load_one_value("cart", &reborn).expect("load"), None, "{mode:?}");
        store.remove_persisted_session("never-existed").expect("remove");
    }
}

#[test]
fn last_access_updates_are_idempotent() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);

        assert_eq!(store.update_last_access_time(&mut session, 2_000).expect("update"), 1);
        assert_eq!(store.update_last_access_time(&mut session, 2_000).expect("update"), 0);
        assert_eq!(reread(store.as_ref(), "s1").current_access_time(), 2_000, "{mode:?}");

        let mut ghost = BackedSession::new("ghost", 1_000, 60);
        assert_eq!(store.update_last_access_time(&mut ghost, 2_000).expect("update"), 0);
    }
}

#[test]
fn qualified_update_requires_matching_access_time() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        let mut stale = reread(store.as_ref(), "s1");

        assert_eq!(
            store
                .over_qualified_last_access_time_update(&mut session, 2_000)
                .expect("update"),
            1
        );
        assert_eq!(session.current_access_time(), 2_000);

        assert_eq!(
            store
                .over_qualified_last_access_time_update(&mut stale, 3_000)
                .expect("update"),
            0,
            "{mode:?}"
        );
        assert_eq!(
            store
                .over_qualified_last_access_time_update(&mut session, 1_500)
                .expect("update"),
            1
        );
        assert_eq!(reread(store.as_ref(), "s1").current_access_time(), 2_000, "{mode:?}");
    }
}

#[test]
fn remote_invalidation_expires_at_the_next_pass() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let _session = inserted(store.as_ref(), "s1", 1_000, 3_600);

        assert_eq!(store.set_max_inactive_to_zero("s1").expect("zero"), 1);
        assert_eq!(store.set_max_inactive_to_zero("s1").expect("zero"), 0);
        assert_eq!(store.set_max_inactive_to_zero("ghost").expect("zero"), 0);

        let outcome = store.perform_invalidation(2_000).expect("invalidate");
        assert_eq!(outcome.expired, vec!["s1".to_owned()], "{mode:?}");
    }
}

#[test]
fn invalidation_expires_idle_sessions_and_returns_listener_sessions() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let _idle = inserted(store.as_ref(), "idle", 0, 60);
        let _busy = inserted(store.as_ref(), "busy", 100_000, 60);
        let _forever = inserted(store.as_ref(), "forever", 0, -1);

        let mut bound = BackedSession::new("bound", 0, 60);
        bound.set_listener_flag(HTTP_SESSION_BINDING_LISTENER);
        store.insert_session(&mut bound).expect("insert");
        bound.set_attribute("conn", AttributeValue::Long(5));
        store.persist_session(&mut bound, true).expect("persist");

        let outcome = store.perform_invalidation(100_000).expect("invalidate");
        assert_eq!(outcome.expired, vec!["idle".to_owned()], "{mode:?}");
        assert_eq!(outcome.listener_sessions.len(), 1, "{mode:?}");
        let unbound = &outcome.listener_sessions[0];
        assert_eq!(unbound.id(), "bound");
        assert!(!unbound.is_valid());
        assert_eq!(unbound.attribute("conn"), Some(&AttributeValue::Long(5)));

        assert!(!store.is_present("idle").expect("lookup"));
        assert!(!store.is_present("bound").expect("lookup"));
        assert!(store.is_present("busy").expect("lookup"));
        assert!(store.is_present("forever").expect("lookup"));
    }
}

#[test]
fn invalidation_runs_once_per_check_interval() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let _busy = inserted(store.as_ref(), "busy", 100_000, 60);
        store.perform_invalidation(100_000).expect("first pass");

        let _late = inserted(store.as_ref(), "late", 0, 60);
        let skipped = store.perform_invalidation(100_500).expect("second pass");
        assert!(skipped.expired.is_empty(), "{mode:?}");
        assert!(store.is_present("late").expect("lookup"));

        let next = store.perform_invalidation(160_000).expect("third pass");
        assert_eq!(next.expired, vec!["late".to_owned()], "{mode:?}");
        assert!(store.is_present("busy").expect("lookup"));
    }
}

#[test]
fn cached_access_times_only_move_forward() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode).with_eos_write(false));
        let _recent = inserted(store.as_ref(), "recent", 0, 60);
        let _old = inserted(store.as_ref(), "old", 50_000, 60);

        store.cache_last_access_time("recent", 90_000);
        store.cache_last_access_time("old", 10);
        store.cache_last_access_time("ghost", 90_000);

        let outcome = store.perform_invalidation(140_000).expect("invalidate");
        assert_eq!(outcome.expired, vec!["old".to_owned()], "{mode:?}");
        assert_eq!(reread(store.as_ref(), "recent").current_access_time(), 90_000);
    }
}

#[test]
fn property_named_like_its_session_fails_persist() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.set_attribute("s1", AttributeValue::Byte(1));

        assert_matches!(
            store.persist_session(&mut session, true),
            Err(CacheStoreError::Record(_)),
            "{mode:?}"
        );
    }
}

#[test]
fn failed_persist_keeps_pending_changes_for_the_next_attempt() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let mut session = inserted(store.as_ref(), "s1", 1_000, 60);
        session.set_attribute("s1", AttributeValue::Byte(1));
        session.set_attribute("z", AttributeValue::Integer(26));
        session.set_user_name(Some("carol".to_owned()));

        assert!(store.persist_session(&mut session, true).is_err(), "{mode:?}");
        assert!(session.app_data_changes().contains("z"), "{mode:?}");
        assert!(session.user_write_hit(), "{mode:?}");
        let stored = reread(store.as_ref(), "s1");
        assert_eq!(store.load_one_value("z", &stored).expect("load"), None);

        session.remove_attribute("s1");
        assert!(store.persist_session(&mut session, true).expect("retry"));
        assert!(!session.has_property_hit(), "{mode:?}");
        assert!(!session.has_metadata_hit(), "{mode:?}");

        let stored = reread(store.as_ref(), "s1");
        assert_eq!(stored.user_name(), Some("carol"), "{mode:?}");
        assert_eq!(
            store.get_all_values(&stored).expect("values"),
            HashMap::from([("z".to_owned(), AttributeValue::Integer(26))]),
            "{mode:?}"
        );
    }
}

#[test]
fn concurrent_persists_keep_every_attribute() {
    for mode in MODES {
        let manager = MemoryCacheManager::new();
        let store = open_store(&manager, config(mode));
        let _session = inserted(store.as_ref(), "s1", 1_000, 60);

        std::thread::scope(|scope| {
            for worker in 0..4_i64 {
                let store = store.as_ref();
                scope.spawn(move || {
                    let mut view = reread(store, "s1");
                    for round in 0..5 {
                        let name = format!("w{worker}-{round}");
                        view.set_attribute(name, AttributeValue::Long(round));
                        store.persist_session(&mut view, true).expect("persist");
                    }
                });
            }
        });

        let values = store
            .get_all_values(&reread(store.as_ref(), "s1"))
            .expect("values");
        assert_eq!(values.len(), 20, "{mode:?}");
        assert_eq!(values.get("w3-4"), Some(&AttributeValue::Long(4)));
    }
}
