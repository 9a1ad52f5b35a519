//! Function registries: incremental aggregates used by the aggregate
//! exchange, scalar functions used in projections, and table-valued
//! functions. Registries are created at engine start; there is no implicit
//! static registration.

pub mod aggregate;
pub mod scalar;
pub mod table_valued;

use std::sync::Arc;

pub use aggregate::{
    AggregateFunctionKind, AggregateFunctionRepository, AggregateState,
};
pub use scalar::{ScalarFunctionKind, ScalarFunctionRepository};
pub use table_valued::{TableValuedFunction, TableValuedFunctionRepository};

/// The process-wide function registry, initialized at `start()` and torn
/// down at `stop()`.
pub struct FunctionRegistry {
    aggregate: AggregateFunctionRepository,
    scalar: ScalarFunctionRepository,
    table_valued: TableValuedFunctionRepository,
}

impl FunctionRegistry {
    /// Registry with the builtin functions registered.
    pub fn builtin() -> Arc<Self> {
        Arc::new(Self {
            aggregate: AggregateFunctionRepository::builtin(),
            scalar: ScalarFunctionRepository::builtin(),
            table_valued: TableValuedFunctionRepository::new(),
        })
    }

    pub fn aggregate(&self) -> &AggregateFunctionRepository {
        &self.aggregate
    }

    pub fn scalar(&self) -> &ScalarFunctionRepository {
        &self.scalar
    }

    pub fn table_valued(&self) -> &TableValuedFunctionRepository {
        &self.table_valued
    }
}
