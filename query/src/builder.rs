//! Fluent, typed query builder.
//!
//! Every add method checks the property against the entity schema. The first
//! failure is recorded and later calls become no-ops, so a chain of calls
//! needs a single error check at [`QueryBuilder::build`]:
//!
//! ```rust
//! # use quarry::{QueryBuilder, QueryError};
//! # use quarry::{Engine, EngineConfig, Entity, EntitySchema, Model, PropertyDef,
//! #     PropertyType, RecordReader, RecordWriter, DecodeError, ObjectId};
//! # #[derive(Default)]
//! # struct Event { id: ObjectId, device: String }
//! # impl Entity for Event {
//! #     const ENTITY_ID: u32 = 1;
//! #     fn schema() -> EntitySchema {
//! #         EntitySchema::new(1, "Event", vec![
//! #             PropertyDef::identity(1, "id"),
//! #             PropertyDef::new(2, "device", PropertyType::String),
//! #         ])
//! #     }
//! #     fn id(&self) -> ObjectId { self.id }
//! #     fn set_id(&mut self, id: ObjectId) { self.id = id }
//! #     fn encode(&self, r: &mut RecordWriter) {
//! #         r.put_id(1, self.id);
//! #         r.put_string(2, &self.device);
//! #     }
//! #     fn decode(r: &RecordReader<'_>) -> Result<Self, DecodeError> {
//! #         Ok(Event { id: r.id()?, device: r.string(2)?.unwrap_or_default() })
//! #     }
//! # }
//! let engine = Engine::open(Model::new().with_entity(Event::schema()), EngineConfig::default())?;
//! let mut builder = QueryBuilder::<Event>::new(&engine)?;
//! builder
//!     .string_starts_with(2, "sensor", false)
//!     .int_greater(1, 10, false)
//!     .double_less(2, 1.0, false);
//! assert!(matches!(builder.build(), Err(QueryError::Schema(_))));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::{
    condition::{resolve, Accepts, Condition, ConditionTree},
    error::{QueryError, Result},
    materialize::Materializer,
    query::Query,
};
use quarry_engine::{Engine, Entity, EntitySchema, Handle, Operand, Operator, PropertyId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Builder of a conjunctive query over entity `E`.
///
/// Owns one engine builder handle until [`close`](Self::close),
/// [`build_and_close`](Self::build_and_close) or drop.
#[derive(Debug)]
pub struct QueryBuilder<E: Entity> {
    engine: Arc<Engine>,
    schema: EntitySchema,
    handle: Option<Handle>,
    /// `None` once `build` has taken the tree.
    state: Option<Result<ConditionTree>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> QueryBuilder<E> {
    /// Start a query over `E`; fails if the engine does not know the entity.
    pub fn new(engine: &Arc<Engine>) -> Result<Self> {
        let schema = engine
            .entity_schema(E::ENTITY_ID)
            .map_err(|e| QueryError::Schema(e.to_string()))?;
        let handle = engine.open_builder(E::ENTITY_ID)?;
        Ok(Self {
            engine: Arc::clone(engine),
            state: Some(Ok(ConditionTree::new(schema.id))),
            schema,
            handle: Some(handle),
            _entity: PhantomData,
        })
    }

    /// The first error recorded by an add call, if any.
    pub fn err(&self) -> Option<&QueryError> {
        self.state.as_ref().and_then(|state| state.as_ref().err())
    }

    /// Conditions collected so far; empty after an error or a build.
    pub fn conditions(&self) -> &[Condition] {
        match &self.state {
            Some(Ok(tree)) => tree.conditions(),
            _ => &[],
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    fn add(
        &mut self,
        property: PropertyId,
        accepts: Accepts,
        condition: impl FnOnce() -> Condition,
    ) -> &mut Self {
        if self.handle.is_none() {
            return self;
        }
        let state = match self.state.take() {
            Some(Ok(mut tree)) => match resolve(&self.schema, property, accepts) {
                Ok(_) => {
                    tree.push(condition());
                    Ok(tree)
                }
                Err(err) => {
                    tracing::warn!(
                        entity = %self.schema.name,
                        property,
                        error = %err,
                        "condition rejected"
                    );
                    Err(err)
                }
            },
            Some(Err(err)) => Err(err),
            None => return self,
        };
        self.state = Some(state);
        self
    }

    fn cmp(
        &mut self,
        property: PropertyId,
        accepts: Accepts,
        operator: Operator,
        operand: Operand,
    ) -> &mut Self {
        self.add(property, accepts, || Condition::new(property, operator, operand))
    }

    fn ordered(
        &mut self,
        property: PropertyId,
        accepts: Accepts,
        operator: Operator,
        operand: Operand,
        or_equal: bool,
    ) -> &mut Self {
        self.add(property, accepts, || {
            Condition::new(property, operator, operand).or_equal(or_equal)
        })
    }

    fn text(
        &mut self,
        property: PropertyId,
        operator: Operator,
        operand: Operand,
        case_sensitive: bool,
        or_equal: bool,
    ) -> &mut Self {
        self.add(property, Accepts::String, || {
            Condition::new(property, operator, operand)
                .case_sensitive(case_sensitive)
                .or_equal(or_equal)
        })
    }

    // Integer family: Bool, Byte, Short, Char, Int, Long, Date, Relation.

    pub fn int_eq(&mut self, property: PropertyId, value: i64) -> &mut Self {
        self.cmp(property, Accepts::Integer, Operator::Eq, Operand::Int(value))
    }

    pub fn int_not_eq(&mut self, property: PropertyId, value: i64) -> &mut Self {
        self.cmp(property, Accepts::Integer, Operator::NotEq, Operand::Int(value))
    }

    pub fn int_less(&mut self, property: PropertyId, value: i64, or_equal: bool) -> &mut Self {
        let operand = Operand::Int(value);
        self.ordered(property, Accepts::Integer, Operator::Less, operand, or_equal)
    }

    pub fn int_greater(&mut self, property: PropertyId, value: i64, or_equal: bool) -> &mut Self {
        let operand = Operand::Int(value);
        self.ordered(property, Accepts::Integer, Operator::Greater, operand, or_equal)
    }

    /// Inclusive on both ends.
    pub fn int_between(&mut self, property: PropertyId, lo: i64, hi: i64) -> &mut Self {
        let operand = Operand::IntRange(lo, hi);
        self.cmp(property, Accepts::Integer, Operator::Between, operand)
    }

    /// Membership for Byte, Short, Char and Int properties.
    pub fn int32_in(&mut self, property: PropertyId, values: &[i32]) -> &mut Self {
        let operand = Operand::Int32Set(values.to_vec());
        self.cmp(property, Accepts::NarrowInteger, Operator::In, operand)
    }

    pub fn int32_not_in(&mut self, property: PropertyId, values: &[i32]) -> &mut Self {
        let operand = Operand::Int32Set(values.to_vec());
        self.cmp(property, Accepts::NarrowInteger, Operator::NotIn, operand)
    }

    /// Membership for Long, Date and Relation properties.
    pub fn int64_in(&mut self, property: PropertyId, values: &[i64]) -> &mut Self {
        let operand = Operand::Int64Set(values.to_vec());
        self.cmp(property, Accepts::WideInteger, Operator::In, operand)
    }

    pub fn int64_not_in(&mut self, property: PropertyId, values: &[i64]) -> &mut Self {
        let operand = Operand::Int64Set(values.to_vec());
        self.cmp(property, Accepts::WideInteger, Operator::NotIn, operand)
    }

    // Float family. Exact equality is not offered.

    pub fn double_less(&mut self, property: PropertyId, value: f64, or_equal: bool) -> &mut Self {
        let operand = Operand::Double(value);
        self.ordered(property, Accepts::Float, Operator::Less, operand, or_equal)
    }

    pub fn double_greater(
        &mut self,
        property: PropertyId,
        value: f64,
        or_equal: bool,
    ) -> &mut Self {
        let operand = Operand::Double(value);
        self.ordered(property, Accepts::Float, Operator::Greater, operand, or_equal)
    }

    pub fn double_between(&mut self, property: PropertyId, lo: f64, hi: f64) -> &mut Self {
        let operand = Operand::DoubleRange(lo, hi);
        self.cmp(property, Accepts::Float, Operator::Between, operand)
    }

    // String family.

    pub fn string_eq(
        &mut self,
        property: PropertyId,
        value: &str,
        case_sensitive: bool,
    ) -> &mut Self {
        self.text(property, Operator::Eq, value.into(), case_sensitive, false)
    }

    pub fn string_not_eq(
        &mut self,
        property: PropertyId,
        value: &str,
        case_sensitive: bool,
    ) -> &mut Self {
        self.text(property, Operator::NotEq, value.into(), case_sensitive, false)
    }

    pub fn string_less(
        &mut self,
        property: PropertyId,
        value: &str,
        case_sensitive: bool,
        or_equal: bool,
    ) -> &mut Self {
        self.text(property, Operator::Less, value.into(), case_sensitive, or_equal)
    }

    pub fn string_greater(
        &mut self,
        property: PropertyId,
        value: &str,
        case_sensitive: bool,
        or_equal: bool,
    ) -> &mut Self {
        self.text(property, Operator::Greater, value.into(), case_sensitive, or_equal)
    }

    pub fn string_contains(
        &mut self,
        property: PropertyId,
        value: &str,
        case_sensitive: bool,
    ) -> &mut Self {
        self.text(property, Operator::Contains, value.into(), case_sensitive, false)
    }

    pub fn string_starts_with(
        &mut self,
        property: PropertyId,
        value: &str,
        case_sensitive: bool,
    ) -> &mut Self {
        self.text(property, Operator::StartsWith, value.into(), case_sensitive, false)
    }

    pub fn string_ends_with(
        &mut self,
        property: PropertyId,
        value: &str,
        case_sensitive: bool,
    ) -> &mut Self {
        self.text(property, Operator::EndsWith, value.into(), case_sensitive, false)
    }

    pub fn string_in(
        &mut self,
        property: PropertyId,
        values: &[&str],
        case_sensitive: bool,
    ) -> &mut Self {
        let set = Operand::StringSet(values.iter().map(|v| v.to_string()).collect());
        self.text(property, Operator::In, set, case_sensitive, false)
    }

    pub fn string_not_in(
        &mut self,
        property: PropertyId,
        values: &[&str],
        case_sensitive: bool,
    ) -> &mut Self {
        let set = Operand::StringSet(values.iter().map(|v| v.to_string()).collect());
        self.text(property, Operator::NotIn, set, case_sensitive, false)
    }

    // Byte vectors compare lexicographically.

    pub fn bytes_eq(&mut self, property: PropertyId, value: &[u8]) -> &mut Self {
        let operand = Operand::Bytes(value.to_vec());
        self.cmp(property, Accepts::Bytes, Operator::Eq, operand)
    }

    pub fn bytes_not_eq(&mut self, property: PropertyId, value: &[u8]) -> &mut Self {
        let operand = Operand::Bytes(value.to_vec());
        self.cmp(property, Accepts::Bytes, Operator::NotEq, operand)
    }

    pub fn bytes_less(&mut self, property: PropertyId, value: &[u8], or_equal: bool) -> &mut Self {
        let operand = Operand::Bytes(value.to_vec());
        self.ordered(property, Accepts::Bytes, Operator::Less, operand, or_equal)
    }

    pub fn bytes_greater(
        &mut self,
        property: PropertyId,
        value: &[u8],
        or_equal: bool,
    ) -> &mut Self {
        let operand = Operand::Bytes(value.to_vec());
        self.ordered(property, Accepts::Bytes, Operator::Greater, operand, or_equal)
    }

    // Presence, any persisted property.

    pub fn is_null(&mut self, property: PropertyId) -> &mut Self {
        self.cmp(property, Accepts::Any, Operator::IsNull, Operand::None)
    }

    pub fn not_null(&mut self, property: PropertyId) -> &mut Self {
        self.cmp(property, Accepts::Any, Operator::NotNull, Operand::None)
    }

    /// Compile the collected conditions into a [`Query`].
    ///
    /// Returns the first recorded error, if any. The builder state is
    /// consumed either way; a second call fails with
    /// [`QueryError::BuilderState`]. The builder handle stays open until
    /// the builder is closed or dropped.
    pub fn build(&mut self) -> Result<Query<E>> {
        let handle = self
            .handle
            .ok_or(QueryError::BuilderState("builder is closed"))?;
        let tree = self
            .state
            .take()
            .ok_or(QueryError::BuilderState("query was already built"))??;

        let query = self.engine.compile(handle, &tree.encode()?)?;
        tracing::debug!(
            entity = %self.schema.name,
            conditions = tree.len(),
            query = %query,
            "query built"
        );
        Ok(Query::new(
            Arc::clone(&self.engine),
            query,
            tree,
            Materializer::new(self.schema.clone()),
        ))
    }

    /// [`build`](Self::build), then release the builder whatever the outcome.
    pub fn build_and_close(mut self) -> Result<Query<E>> {
        let query = self.build();
        self.close();
        query
    }

    /// Release the builder handle. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.release(handle);
        }
    }
}

impl<E: Entity> Drop for QueryBuilder<E> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_engine::{
        DecodeError, EngineConfig, Model, ObjectId, PropertyDef, PropertyType, RecordReader,
        RecordWriter,
    };

    #[derive(Debug, Default)]
    struct Gauge {
        id: ObjectId,
    }

    impl Entity for Gauge {
        const ENTITY_ID: u32 = 1;

        fn schema() -> EntitySchema {
            EntitySchema::new(
                1,
                "Gauge",
                vec![
                    PropertyDef::identity(1, "id"),
                    PropertyDef::new(2, "name", PropertyType::String),
                    PropertyDef::new(3, "level", PropertyType::Int),
                    PropertyDef::new(4, "reading", PropertyType::Double),
                    PropertyDef::new(5, "blob", PropertyType::ByteVector),
                    PropertyDef::new(6, "memo", PropertyType::String).transient(),
                ],
            )
        }

        fn id(&self) -> ObjectId {
            self.id
        }

        fn set_id(&mut self, id: ObjectId) {
            self.id = id;
        }

        fn encode(&self, record: &mut RecordWriter) {
            record.put_id(1, self.id);
        }

        fn decode(record: &RecordReader<'_>) -> std::result::Result<Self, DecodeError> {
            Ok(Gauge { id: record.id()? })
        }
    }

    fn engine() -> Arc<Engine> {
        Engine::open(Model::new().with_entity(Gauge::schema()), EngineConfig::default()).unwrap()
    }

    #[test]
    fn collects_conditions_in_order() {
        let engine = engine();
        let mut builder = QueryBuilder::<Gauge>::new(&engine).unwrap();
        builder
            .string_eq(2, "a", false)
            .int_greater(3, 5, true)
            .double_between(4, 0.5, 1.5)
            .bytes_eq(5, &[1, 2])
            .not_null(2);

        let conditions = builder.conditions();
        assert_eq!(conditions.len(), 5);
        assert_eq!(conditions[0].operator, Operator::Eq);
        assert!(!conditions[0].case_sensitive);
        assert!(conditions[1].or_equal);
        assert_eq!(conditions[2].operand, Operand::DoubleRange(0.5, 1.5));
        assert_eq!(conditions[4].operand, Operand::None);
        assert!(builder.err().is_none());
    }

    #[test]
    fn first_error_sticks() {
        let engine = engine();
        let mut builder = QueryBuilder::<Gauge>::new(&engine).unwrap();
        builder.double_less(2, 1.0, false);
        let first = builder.err().cloned();
        assert!(matches!(first, Some(QueryError::Schema(ref msg)) if msg.contains("name")));

        builder.int_eq(99, 1).string_eq(2, "ok", true);
        assert_eq!(builder.err().cloned(), first);
        assert!(builder.conditions().is_empty());
        assert_eq!(builder.build().err(), first);
    }

    #[test]
    fn family_mismatches_are_schema_errors() {
        let engine = engine();
        let cases: Vec<Box<dyn Fn(&mut QueryBuilder<Gauge>)>> = vec![
            Box::new(|b: &mut QueryBuilder<Gauge>| {
                b.int_eq(4, 1);
            }),
            Box::new(|b: &mut QueryBuilder<Gauge>| {
                b.int64_in(3, &[1]);
            }),
            Box::new(|b: &mut QueryBuilder<Gauge>| {
                b.string_contains(3, "x", true);
            }),
            Box::new(|b: &mut QueryBuilder<Gauge>| {
                b.bytes_less(2, &[1], false);
            }),
            Box::new(|b: &mut QueryBuilder<Gauge>| {
                b.is_null(6);
            }),
        ];
        for case in cases {
            let mut builder = QueryBuilder::<Gauge>::new(&engine).unwrap();
            case(&mut builder);
            assert!(matches!(builder.err(), Some(QueryError::Schema(_))));
        }
    }

    #[test]
    fn build_consumes_state() {
        let engine = engine();
        let mut builder = QueryBuilder::<Gauge>::new(&engine).unwrap();
        builder.int32_in(3, &[1, 2]);
        let query = builder.build().unwrap();
        assert_eq!(query.conditions().len(), 1);

        builder.int_eq(3, 1);
        assert!(builder.conditions().is_empty());
        assert!(matches!(
            builder.build(),
            Err(QueryError::BuilderState(_))
        ));
    }

    #[test]
    fn closed_builder_rejects_build() {
        let engine = engine();
        let mut builder = QueryBuilder::<Gauge>::new(&engine).unwrap();
        builder.close();
        builder.close();
        assert!(builder.is_closed());
        assert_eq!(engine.open_handles(), 0);
        assert!(matches!(
            builder.build(),
            Err(QueryError::BuilderState("builder is closed"))
        ));
    }

    #[test]
    fn build_and_close_releases_builder() {
        let engine = engine();
        let builder = QueryBuilder::<Gauge>::new(&engine).unwrap();
        let query = builder.build_and_close().unwrap();
        assert_eq!(engine.open_handles(), 1);
        drop(query);
        assert_eq!(engine.open_handles(), 0);
    }

    #[test]
    fn build_and_close_releases_on_error() {
        let engine = engine();
        let mut builder = QueryBuilder::<Gauge>::new(&engine).unwrap();
        builder.int_eq(42, 1);
        assert!(builder.build_and_close().is_err());
        assert_eq!(engine.open_handles(), 0);
    }

    #[test]
    fn unknown_entity() {
        let engine = Engine::open(Model::new(), EngineConfig::default()).unwrap();
        assert!(matches!(
            QueryBuilder::<Gauge>::new(&engine),
            Err(QueryError::Schema(_))
        ));
    }
}
