//! Property-based test generators using proptest.
//!
//! Provides strategies for generating names, object data and class
//! descriptors, including values that collide with the store's internal
//! encodings.

use proptest::prelude::*;

/// Strategy for generating binding names, including non-ASCII and empty
/// names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-z]{0,6}").expect("Invalid regex"),
        prop::string::string_regex("[a-zA-Z0-9_.]{1,24}").expect("Invalid regex"),
        any::<String>(),
    ]
}

/// Strategy for generating object data.
///
/// Often starts with the bytes the store uses to mark placeholders and
/// quoted values, so escaping is exercised.
pub fn object_data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..256),
        (prop::sample::select(vec![3u8, 4u8]), prop::collection::vec(any::<u8>(), 0..16))
            .prop_map(|(first, rest)| {
                let mut data = vec![first];
                data.extend(rest);
                data
            }),
    ]
}

/// Strategy for generating a set of distinct binding names.
pub fn distinct_names_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(name_strategy(), 1..max.max(2))
        .prop_map(|names| names.into_iter().collect())
}

/// Strategy for generating class descriptor blobs.
pub fn class_info_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..128)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn distinct_names_are_sorted(names in distinct_names_strategy(8)) {
            let mut sorted = names.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(names, sorted);
        }
    }
}
