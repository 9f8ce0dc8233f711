//! Listing order: folders group before objects, then case-insensitive by key

use std::cmp::Ordering;

use crate::model::entry::Entry;

/// Compare two entries so that folders sort ahead of objects and keys within
/// each group compare case-insensitively.
pub fn cmp_entries(a: &Entry, b: &Entry) -> Ordering {
    match (a.is_folder, b.is_folder) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.key.to_lowercase().cmp(&b.key.to_lowercase()),
    }
}

/// Sort a row set in place into display order
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(cmp_entries);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folders_sort_before_objects() {
        let mut entries = vec![
            Entry::object("aardvark.txt", Some(1), None, None),
            Entry::folder("zebra/"),
        ];
        sort_entries(&mut entries);
        assert_eq!(entries[0].key, "zebra/");
        assert_eq!(entries[1].key, "aardvark.txt");
    }

    #[test]
    fn test_case_insensitive_within_group() {
        let mut entries = vec![
            Entry::object("Banana.txt", None, None, None),
            Entry::object("apple.txt", None, None, None),
        ];
        sort_entries(&mut entries);
        assert_eq!(entries[0].key, "apple.txt");
        assert_eq!(entries[1].key, "Banana.txt");
    }

    #[test]
    fn test_stable_for_equal_keys() {
        let a = Entry::folder("cars/");
        let b = Entry::folder("cars/");
        assert_eq!(cmp_entries(&a, &b), Ordering::Equal);
    }
}
