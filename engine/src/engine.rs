//! The engine: store access, native handles and query execution.
//!
//! Builders and compiled queries are referred to by [`Handle`]s. Handles are
//! a limited resource (see [`EngineConfig::max_handles`]) and must be
//! released exactly once.

use crate::{
    codec::RecordReader,
    config::{DebugFlags, EngineConfig},
    error::Result,
    schema::{EntitySchema, Model, PropertyDef, PropertyType, TypeFamily},
    store::Store,
    value::PropertyValue,
    wire::{self, ConditionFrame, Operand, OperandKind, Operator, Reader, WireError},
    EntityId, Error,
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque reference to an engine-side builder or query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
enum HandleEntry {
    Builder { entity: EntityId },
    Query(Arc<CompiledQuery>),
}

#[derive(Debug)]
struct HandleTable {
    next: u64,
    max: usize,
    entries: HashMap<u64, HandleEntry>,
}

impl HandleTable {
    fn insert(&mut self, entry: HandleEntry) -> Result<Handle> {
        if self.entries.len() >= self.max {
            return Err(Error::HandleLimit { max: self.max });
        }
        self.next += 1;
        self.entries.insert(self.next, entry);
        Ok(Handle(self.next))
    }

    fn query(&self, handle: Handle) -> Result<Arc<CompiledQuery>> {
        match self.entries.get(&handle.0) {
            Some(HandleEntry::Query(query)) => Ok(Arc::clone(query)),
            Some(HandleEntry::Builder { .. }) => Err(Error::WrongHandleKind(handle.0, "query")),
            None => Err(Error::HandleNotFound(handle.0)),
        }
    }

    fn query_mut(&mut self, handle: Handle) -> Result<&mut CompiledQuery> {
        match self.entries.get_mut(&handle.0) {
            Some(HandleEntry::Query(query)) => Ok(Arc::make_mut(query)),
            Some(HandleEntry::Builder { .. }) => Err(Error::WrongHandleKind(handle.0, "query")),
            None => Err(Error::HandleNotFound(handle.0)),
        }
    }
}

/// One compiled condition, bound to its property definition.
#[derive(Debug, Clone)]
struct Predicate {
    operator: Operator,
    property: PropertyDef,
    case_sensitive: bool,
    or_equal: bool,
    operand: Operand,
}

impl Predicate {
    fn compile(schema: &EntitySchema, frame: ConditionFrame) -> Result<Self> {
        let property = schema
            .property(frame.property)
            .filter(|p| !p.is_transient())
            .ok_or(Error::UnknownProperty {
                entity: schema.id,
                property: frame.property,
            })?;

        let expected = expected_operand(frame.operator, property.property_type).ok_or_else(|| {
            Error::InvalidPlan(format!(
                "operator '{}' is not defined for {} property {}",
                frame.operator, property.property_type, property.id
            ))
        })?;
        if frame.operand.kind() != expected {
            return Err(Error::OperandMismatch {
                property: property.id,
                expected: expected.to_string(),
                got: frame.operand.kind().to_string(),
            });
        }

        let mut predicate = Self {
            operator: frame.operator,
            property: property.clone(),
            case_sensitive: frame.case_sensitive(),
            or_equal: frame.or_equal(),
            operand: frame.operand,
        };
        predicate.fold_operand();
        Ok(predicate)
    }

    /// Case-insensitive string operands are stored folded once.
    fn fold_operand(&mut self) {
        if self.case_sensitive {
            return;
        }
        match &mut self.operand {
            Operand::String(s) => *s = fold_case(s).into_owned(),
            Operand::StringSet(set) => {
                set.iter_mut().for_each(|s| *s = fold_case(s).into_owned())
            }
            _ => {}
        }
    }

    fn matches(&self, record: &RecordReader<'_>) -> bool {
        let value = record.value(self.property.id);
        match self.operator {
            Operator::IsNull => value.is_none(),
            Operator::NotNull => value.is_some(),
            _ => value.is_some_and(|v| self.test(v)),
        }
    }

    fn test(&self, value: PropertyValue<'_>) -> bool {
        match self.property.property_type.family() {
            TypeFamily::Integer => value.as_i64().is_some_and(|v| self.test_int(v)),
            TypeFamily::Float => value.as_f64().is_some_and(|v| self.test_double(v)),
            TypeFamily::String => value.as_str().is_some_and(|v| self.test_string(v)),
            TypeFamily::Bytes => value.as_bytes().is_some_and(|v| self.test_bytes(v)),
        }
    }

    fn test_int(&self, v: i64) -> bool {
        match (&self.operand, self.operator) {
            (Operand::Int(x), Operator::Eq) => v == *x,
            (Operand::Int(x), Operator::NotEq) => v != *x,
            (Operand::Int(x), Operator::Less) => v < *x || (self.or_equal && v == *x),
            (Operand::Int(x), Operator::Greater) => v > *x || (self.or_equal && v == *x),
            (Operand::IntRange(lo, hi), Operator::Between) => *lo <= v && v <= *hi,
            (Operand::Int32Set(set), op) => set_test(op, set.iter().any(|x| *x as i64 == v)),
            (Operand::Int64Set(set), op) => set_test(op, set.contains(&v)),
            _ => false,
        }
    }

    fn test_double(&self, v: f64) -> bool {
        match (&self.operand, self.operator) {
            (Operand::Double(x), Operator::Less) => v < *x || (self.or_equal && v == *x),
            (Operand::Double(x), Operator::Greater) => v > *x || (self.or_equal && v == *x),
            (Operand::DoubleRange(lo, hi), Operator::Between) => *lo <= v && v <= *hi,
            _ => false,
        }
    }

    fn test_string(&self, v: &str) -> bool {
        let v = if self.case_sensitive {
            Cow::Borrowed(v)
        } else {
            fold_case(v)
        };
        match (&self.operand, self.operator) {
            (Operand::String(x), Operator::Eq) => *v == **x,
            (Operand::String(x), Operator::NotEq) => *v != **x,
            (Operand::String(x), Operator::Less) => {
                *v < **x || (self.or_equal && *v == **x)
            }
            (Operand::String(x), Operator::Greater) => {
                *v > **x || (self.or_equal && *v == **x)
            }
            (Operand::String(x), Operator::Contains) => v.contains(x.as_str()),
            (Operand::String(x), Operator::StartsWith) => v.starts_with(x.as_str()),
            (Operand::String(x), Operator::EndsWith) => v.ends_with(x.as_str()),
            (Operand::StringSet(set), op) => set_test(op, set.iter().any(|x| *x == *v)),
            _ => false,
        }
    }

    fn test_bytes(&self, v: &[u8]) -> bool {
        match (&self.operand, self.operator) {
            (Operand::Bytes(x), Operator::Eq) => v == x.as_slice(),
            (Operand::Bytes(x), Operator::NotEq) => v != x.as_slice(),
            (Operand::Bytes(x), Operator::Less) => {
                v < x.as_slice() || (self.or_equal && v == x.as_slice())
            }
            (Operand::Bytes(x), Operator::Greater) => {
                v > x.as_slice() || (self.or_equal && v == x.as_slice())
            }
            _ => false,
        }
    }
}

/// Case fold used by case-insensitive string conditions.
///
/// Each character is lowercased on its own and final sigma folds to sigma,
/// so a value folds the same whether it is stored or used as an operand.
pub fn fold_case(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Cow::Owned(s.to_ascii_lowercase());
        }
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.chars()
            .flat_map(char::to_lowercase)
            .map(|c| if c == 'ς' { 'σ' } else { c })
            .collect(),
    )
}

fn set_test(operator: Operator, found: bool) -> bool {
    match operator {
        Operator::In => found,
        Operator::NotIn => !found,
        _ => false,
    }
}

/// Operand kind an operator takes on a property type, `None` when the
/// combination is not supported.
pub fn expected_operand(operator: Operator, ty: PropertyType) -> Option<OperandKind> {
    use Operator::*;
    match (ty.family(), operator) {
        (_, IsNull | NotNull) => Some(OperandKind::None),
        (TypeFamily::Integer, Eq | NotEq | Less | Greater) => Some(OperandKind::Int),
        (TypeFamily::Integer, Between) => Some(OperandKind::IntRange),
        (TypeFamily::Integer, In | NotIn) if ty.is_narrow_integer() => {
            Some(OperandKind::Int32Set)
        }
        (TypeFamily::Integer, In | NotIn) if ty.is_wide_integer() => Some(OperandKind::Int64Set),
        (TypeFamily::Float, Less | Greater) => Some(OperandKind::Double),
        (TypeFamily::Float, Between) => Some(OperandKind::DoubleRange),
        (TypeFamily::String, Eq | NotEq | Less | Greater | Contains | StartsWith | EndsWith) => {
            Some(OperandKind::String)
        }
        (TypeFamily::String, In | NotIn) => Some(OperandKind::StringSet),
        (TypeFamily::Bytes, Eq | NotEq | Less | Greater) => Some(OperandKind::Bytes),
        _ => None,
    }
}

/// A compiled, executable query.
#[derive(Debug, Clone)]
struct CompiledQuery {
    entity: EntityId,
    predicates: Vec<Predicate>,
}

impl CompiledQuery {
    fn describe(&self) -> String {
        if self.predicates.is_empty() {
            return "TRUE".to_string();
        }
        self.predicates
            .iter()
            .map(|p| {
                let folded =
                    p.property.property_type == PropertyType::String && !p.case_sensitive;
                let case = if folded {
                    " (case insensitive)"
                } else {
                    ""
                };
                let eq = if p.or_equal { "=" } else { "" };
                format!("{} {}{} {}{}", p.property.name, p.operator, eq, p.operand, case)
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// The embedded engine.
#[derive(Debug)]
pub struct Engine {
    store: RwLock<Store>,
    handles: Mutex<HandleTable>,
    debug_flags: Mutex<DebugFlags>,
}

impl Engine {
    /// Open an engine over a model.
    pub fn open(model: Model, config: EngineConfig) -> Result<Arc<Self>> {
        model.validate()?;
        tracing::debug!(
            entities = model.entities.len(),
            max_handles = config.max_handles,
            "opening engine"
        );
        Ok(Arc::new(Self {
            store: RwLock::new(Store::new(model)),
            handles: Mutex::new(HandleTable {
                next: 0,
                max: config.max_handles,
                entries: HashMap::new(),
            }),
            debug_flags: Mutex::new(config.debug_flags),
        }))
    }

    /// Change diagnostic logging at runtime.
    pub fn set_debug_flags(&self, flags: DebugFlags) {
        *self.debug_flags.lock() = flags;
    }

    pub fn debug_flags(&self) -> DebugFlags {
        *self.debug_flags.lock()
    }

    /// Schema of an entity.
    pub fn entity_schema(&self, entity: EntityId) -> Result<EntitySchema> {
        self.store
            .read()
            .model()
            .entity(entity)
            .cloned()
            .ok_or(Error::UnknownEntity(entity))
    }

    pub(crate) fn read_store(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read()
    }

    pub(crate) fn write_store(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write()
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.lock().entries.len()
    }

    /// Open a builder handle for an entity.
    pub fn open_builder(&self, entity: EntityId) -> Result<Handle> {
        if self.store.read().model().entity(entity).is_none() {
            return Err(Error::UnknownEntity(entity));
        }
        let handle = self.handles.lock().insert(HandleEntry::Builder { entity })?;
        tracing::debug!(%handle, entity, "builder handle opened");
        Ok(handle)
    }

    /// Compile a condition plan produced by a builder.
    pub fn compile(&self, builder: Handle, plan: &[u8]) -> Result<Handle> {
        let (entity, frames) = wire::decode_plan(plan).map_err(plan_error)?;

        let builder_entity = match self.handles.lock().entries.get(&builder.0) {
            Some(HandleEntry::Builder { entity }) => *entity,
            Some(HandleEntry::Query(_)) => {
                return Err(Error::WrongHandleKind(builder.0, "builder"))
            }
            None => return Err(Error::HandleNotFound(builder.0)),
        };
        if builder_entity != entity {
            return Err(Error::InvalidPlan(format!(
                "plan targets entity {entity}, builder was opened for {builder_entity}"
            )));
        }

        let schema = self.entity_schema(entity)?;
        let predicates = frames
            .into_iter()
            .map(|frame| Predicate::compile(&schema, frame))
            .collect::<Result<Vec<_>>>()?;
        let query = CompiledQuery { entity, predicates };

        let description = query.describe();
        let handle = self.handles.lock().insert(HandleEntry::Query(Arc::new(query)))?;
        if self.debug_flags().contains(DebugFlags::LOG_QUERIES) {
            tracing::info!(%handle, entity, query = %description, "query compiled");
        } else {
            tracing::debug!(%handle, entity, "query compiled");
        }
        Ok(handle)
    }

    /// Replace the operand of the condition at `index`.
    ///
    /// The operand kind must equal the compiled one; the structure of the
    /// query never changes.
    pub fn set_param(&self, query: Handle, index: usize, operand: &[u8]) -> Result<()> {
        let mut reader = Reader::new(operand);
        let operand = Operand::decode(&mut reader).map_err(plan_error)?;
        reader.finish().map_err(|e| plan_error(e.into()))?;

        let mut handles = self.handles.lock();
        let compiled = handles.query_mut(query)?;
        let predicate = compiled.predicates.get_mut(index).ok_or_else(|| {
            Error::InvalidPlan(format!("query {query} has no condition {index}"))
        })?;
        if predicate.operand.kind() != operand.kind() {
            return Err(Error::OperandMismatch {
                property: predicate.property.id,
                expected: predicate.operand.kind().to_string(),
                got: operand.kind().to_string(),
            });
        }

        if self.debug_flags().contains(DebugFlags::LOG_QUERY_PARAMETERS) {
            tracing::info!(
                handle = %query,
                property = %predicate.property.name,
                value = %operand,
                "query parameter set"
            );
        }
        predicate.operand = operand;
        predicate.fold_operand();
        Ok(())
    }

    /// Run a query and return the matching records in id order.
    pub fn execute(&self, query: Handle) -> Result<Vec<Vec<u8>>> {
        let compiled = self.handles.lock().query(query)?;
        if self.debug_flags().contains(DebugFlags::LOG_QUERIES) {
            tracing::info!(handle = %query, query = %compiled.describe(), "executing query");
        }

        let store = self.store.read();
        let mut out = Vec::new();
        scan(&store, &compiled, |bytes| out.push(bytes.to_vec()))?;
        tracing::debug!(handle = %query, matches = out.len(), "query executed");
        Ok(out)
    }

    /// Count the records a query matches.
    pub fn count(&self, query: Handle) -> Result<usize> {
        let compiled = self.handles.lock().query(query)?;
        let store = self.store.read();
        let mut count = 0;
        scan(&store, &compiled, |_| count += 1)?;
        Ok(count)
    }

    /// Release a handle; returns whether it was still open.
    pub fn release(&self, handle: Handle) -> bool {
        let released = self.handles.lock().entries.remove(&handle.0).is_some();
        if released {
            tracing::debug!(%handle, "handle released");
        }
        released
    }
}

fn scan(store: &Store, query: &CompiledQuery, mut emit: impl FnMut(&[u8])) -> Result<()> {
    let schema = store
        .model()
        .entity(query.entity)
        .ok_or(Error::UnknownEntity(query.entity))?;
    for (_, bytes) in store.collection(query.entity)?.records() {
        if query.predicates.is_empty() {
            emit(bytes);
            continue;
        }
        let record = RecordReader::parse(bytes, schema)?;
        if query.predicates.iter().all(|p| p.matches(&record)) {
            emit(bytes);
        }
    }
    Ok(())
}

fn plan_error(err: WireError) -> Error {
    Error::InvalidPlan(err.to_string())
}
