use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cascade_lib::error::EngineResult;
use cascade_lib::record::{Record, RecordMeta};
use cascade_lib::value::Value;

/// A function producing a record stream from scalar arguments.
pub trait TableValuedFunction: Send + Sync {
    fn meta(&self) -> RecordMeta;

    fn produce(&self, arguments: &[Value]) -> EngineResult<Vec<Record>>;
}

/// Name-keyed repository of table-valued functions. Empty by default;
/// hosts register their own providers at start.
pub struct TableValuedFunctionRepository {
    map: RwLock<HashMap<String, Arc<dyn TableValuedFunction>>>,
}

impl TableValuedFunctionRepository {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: &str, function: Arc<dyn TableValuedFunction>) {
        self.map
            .write()
            .unwrap()
            .insert(name.to_ascii_lowercase(), function);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn TableValuedFunction>> {
        self.map
            .read()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn size(&self) -> usize {
        self.map.read().unwrap().len()
    }
}

impl Default for TableValuedFunctionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_lib::field_type::FieldTypeKind;
    use cascade_lib::record::Field;

    struct Series;

    impl TableValuedFunction for Series {
        fn meta(&self) -> RecordMeta {
            RecordMeta::new(vec![Field::new("n", FieldTypeKind::Int8)])
        }

        fn produce(&self, arguments: &[Value]) -> EngineResult<Vec<Record>> {
            let n = arguments[0].as_int().unwrap_or(0);
            Ok((0..n).map(|i| Record::new(vec![Value::Int8(i)])).collect())
        }
    }

    #[test]
    fn test_register_and_produce() {
        let repo = TableValuedFunctionRepository::new();
        repo.register("series", Arc::new(Series));
        let f = repo.find("SERIES").unwrap();
        assert_eq!(f.produce(&[Value::Int8(3)]).unwrap().len(), 3);
        assert!(repo.find("missing").is_none());
    }
}
