//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records that keep the hierarchy's
//! invariants: valid ids, UTC timestamps at millisecond precision, and
//! required fields filled in.

use chrono::{DateTime, TimeZone, Utc};
use liftsync_model::{EntityId, ExerciseSet, Plan, UserId};
use proptest::prelude::*;

/// Strategy for generating entity ids.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    any::<u128>().prop_map(|n| EntityId::from_uuid(uuid::Uuid::from_u128(n)))
}

/// Strategy for generating user ids.
pub fn user_id_strategy() -> impl Strategy<Value = UserId> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}")
        .expect("Invalid regex")
        .prop_map(UserId::new)
}

/// Strategy for generating non-blank display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,31}").expect("Invalid regex")
}

/// Strategy for generating timestamps between 2020 and 2030 at
/// millisecond precision.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800_000i64..1_893_456_000_000).prop_map(|ms| {
        Utc.timestamp_millis_opt(ms)
            .single()
            .expect("Timestamp in range")
    })
}

/// Strategy for generating dirty plans owned by `user`.
pub fn plan_strategy(user: UserId) -> impl Strategy<Value = Plan> {
    (
        name_strategy(),
        proptest::option::of("[a-z ]{0,64}"),
        any::<bool>(),
        timestamp_strategy(),
    )
        .prop_map(move |(name, description, is_active, now)| {
            let mut plan = Plan::new(user.clone(), name, now);
            plan.description = description;
            plan.is_active = is_active;
            plan
        })
}

/// Strategy for generating dirty, pushable sets under `exercise_id`.
pub fn set_strategy(user: UserId, exercise_id: EntityId) -> impl Strategy<Value = ExerciseSet> {
    (
        0i32..20,
        0u32..50,
        proptest::option::of(0u32..4000),
        proptest::option::of(0u32..600),
        timestamp_strategy(),
    )
        .prop_map(move |(order_index, repetitions, decigrams, rest_time, now)| {
            let mut set = ExerciseSet::new(user.clone(), exercise_id, order_index, repetitions, now);
            set.weight = decigrams.map(|d| f64::from(d) / 10.0);
            set.rest_time = rest_time;
            set
        })
}
