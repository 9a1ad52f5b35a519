use cascade_lib::record::Record;

use crate::executor::exchange::priority_queue_reader::PriorityQueueReader;

/// Read handle over one output partition of an exchange.
pub enum ExchangeReader {
    /// Plain record stream (forward/broadcast/aggregate output).
    Records { records: Vec<Record>, pos: usize },
    /// Key-ordered grouped stream (group exchange).
    Group(PriorityQueueReader),
}

impl ExchangeReader {
    pub fn records(records: Vec<Record>) -> Self {
        Self::Records { records, pos: 0 }
    }

    pub fn group(reader: PriorityQueueReader) -> Self {
        Self::Group(reader)
    }

    /// Flattened record-at-a-time view. For the group variant, members
    /// stream out in key order.
    pub fn next_record(&mut self) -> Option<Record> {
        match self {
            ExchangeReader::Records { records, pos } => {
                if *pos < records.len() {
                    let r = records[*pos].clone();
                    *pos += 1;
                    Some(r)
                } else {
                    None
                }
            }
            ExchangeReader::Group(reader) => loop {
                if reader.next_member() {
                    return Some(reader.get_member().clone());
                }
                if !reader.next_group() {
                    return None;
                }
            },
        }
    }

    /// The grouped view, when this is a group exchange read.
    pub fn as_group(&mut self) -> Option<&mut PriorityQueueReader> {
        match self {
            ExchangeReader::Group(reader) => Some(reader),
            ExchangeReader::Records { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_lib::value::Value;

    fn rec(k: i32) -> Record {
        Record::new(vec![Value::Int4(k)])
    }

    #[test]
    fn test_records_variant_streams_in_order() {
        let mut r = ExchangeReader::records(vec![rec(1), rec(2)]);
        assert_eq!(r.next_record().unwrap().value(0).as_int(), Some(1));
        assert_eq!(r.next_record().unwrap().value(0).as_int(), Some(2));
        assert!(r.next_record().is_none());
    }

    #[test]
    fn test_group_variant_flattens_in_key_order() {
        let reader =
            PriorityQueueReader::new(vec![0], vec![vec![rec(2)], vec![rec(1), rec(3)]]);
        let mut r = ExchangeReader::group(reader);
        let mut keys = Vec::new();
        while let Some(record) = r.next_record() {
            keys.push(record.value(0).as_int().unwrap());
        }
        assert_eq!(keys, vec![1, 2, 3]);
    }
}
