pub fn contains_duplicates<T: Ord>(vec: &[T]) -> bool {
    let mut set = std::collections::BTreeSet::new();
    for item in vec {
        if !set.insert(item) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates() {
        assert!(contains_duplicates(&[1, 2, 1]));
        assert!(!contains_duplicates(&[1, 2, 3]));
        assert!(!contains_duplicates::<usize>(&[]));
    }
}
