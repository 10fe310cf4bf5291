use crate::key::KeyId;
use smallvec::SmallVec;

/// Sorted `(key, value)` pairs identifying one series of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Series rarely carry more than a handful of tags.
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut tags: SmallVec<[(KeyId, KeyId); 4]> = pairs.into_iter().collect();
        tags.sort_unstable();
        tags.dedup_by(|a, b| a.0 == b.0);
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let idx = self.tags.partition_point(|(k, _)| *k < key);
        self.tags.get(idx).and_then(|(k, v)| (*k == key).then_some(*v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pairs_sorts_and_keeps_one_value_per_key() {
        let a = KeyId::from(1);
        let b = KeyId::from(2);
        let c = KeyId::from(3);

        let set = TagSet::from_pairs([(c, a), (a, b), (a, c)]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(a), Some(b));
        assert_eq!(set.get(c), Some(a));
        assert_eq!(set.get(b), None);
    }
}
