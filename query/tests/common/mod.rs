//! IoT test model shared by the integration tests.

#![allow(dead_code)]

use quarry::{
    DecodeError, Engine, EngineConfig, Entity, EntityBox, EntitySchema, IndexKind, Model,
    ObjectId, PropertyDef, PropertyType, RecordReader, RecordWriter,
};
use std::sync::Arc;

pub const EVENT_ID: u16 = 1;
pub const EVENT_DEVICE: u16 = 2;
pub const EVENT_DATE: u16 = 3;
pub const EVENT_UID: u16 = 4;
pub const EVENT_PICTURE: u16 = 5;

pub const READING_ID: u16 = 1;
pub const READING_DATE: u16 = 2;
pub const READING_EVENT: u16 = 3;
pub const READING_NAME: u16 = 4;
pub const READING_TEXT: u16 = 5;
pub const READING_LONG: u16 = 6;
pub const READING_FLOAT: u16 = 7;
pub const READING_INT: u16 = 8;
pub const READING_DOUBLE: u16 = 9;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub id: ObjectId,
    pub device: String,
    pub date: i64,
    pub uid: String,
    pub picture: Option<Vec<u8>>,
}

impl Entity for Event {
    const ENTITY_ID: u32 = 1;

    fn schema() -> EntitySchema {
        EntitySchema::new(
            1,
            "Event",
            vec![
                PropertyDef::identity(EVENT_ID, "id"),
                PropertyDef::new(EVENT_DEVICE, "device", PropertyType::String),
                PropertyDef::new(EVENT_DATE, "date", PropertyType::Date),
                PropertyDef::new(EVENT_UID, "uid", PropertyType::String)
                    .indexed(IndexKind::Hash)
                    .unique(),
                PropertyDef::new(EVENT_PICTURE, "picture", PropertyType::ByteVector).nullable(),
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
        record.put_id(EVENT_ID, self.id);
        record.put_string(EVENT_DEVICE, &self.device);
        record.put_date(EVENT_DATE, self.date);
        record.put_string(EVENT_UID, &self.uid);
        if let Some(picture) = &self.picture {
            record.put_bytes(EVENT_PICTURE, picture);
        }
    }

    fn decode(record: &RecordReader<'_>) -> Result<Self, DecodeError> {
        Ok(Event {
            id: record.id()?,
            device: record.string(EVENT_DEVICE)?.unwrap_or_default(),
            date: record.date(EVENT_DATE)?.unwrap_or_default(),
            uid: record.string(EVENT_UID)?.unwrap_or_default(),
            picture: record.bytes(EVENT_PICTURE)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    pub id: ObjectId,
    pub date: i64,
    pub event_id: ObjectId,
    pub value_name: String,
    pub value_string: String,
    pub value_integer: i64,
    pub value_floating: f64,
    pub value_int32: i32,
    pub value_float32: f32,
}

impl Entity for Reading {
    const ENTITY_ID: u32 = 2;

    fn schema() -> EntitySchema {
        EntitySchema::new(
            2,
            "Reading",
            vec![
                PropertyDef::identity(READING_ID, "id"),
                PropertyDef::new(READING_DATE, "date", PropertyType::Date),
                PropertyDef::relation(READING_EVENT, "eventId", Event::ENTITY_ID),
                PropertyDef::new(READING_NAME, "valueName", PropertyType::String),
                PropertyDef::new(READING_TEXT, "valueString", PropertyType::String),
                PropertyDef::new(READING_LONG, "valueInteger", PropertyType::Long),
                PropertyDef::new(READING_FLOAT, "valueFloat32", PropertyType::Float),
                PropertyDef::new(READING_INT, "valueInt32", PropertyType::Int),
                PropertyDef::new(READING_DOUBLE, "valueFloating", PropertyType::Double),
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
        record.put_id(READING_ID, self.id);
        record.put_date(READING_DATE, self.date);
        if self.event_id != 0 {
            record.put_relation(READING_EVENT, self.event_id);
        }
        record.put_string(READING_NAME, &self.value_name);
        record.put_string(READING_TEXT, &self.value_string);
        record.put_long(READING_LONG, self.value_integer);
        record.put_float(READING_FLOAT, self.value_float32);
        record.put_int(READING_INT, self.value_int32);
        record.put_double(READING_DOUBLE, self.value_floating);
    }

    fn decode(record: &RecordReader<'_>) -> Result<Self, DecodeError> {
        Ok(Reading {
            id: record.id()?,
            date: record.date(READING_DATE)?.unwrap_or_default(),
            event_id: record.relation(READING_EVENT)?.unwrap_or_default(),
            value_name: record.string(READING_NAME)?.unwrap_or_default(),
            value_string: record.string(READING_TEXT)?.unwrap_or_default(),
            value_integer: record.long(READING_LONG)?.unwrap_or_default(),
            value_float32: record.float(READING_FLOAT)?.unwrap_or_default(),
            value_int32: record.int(READING_INT)?.unwrap_or_default(),
            value_floating: record.double(READING_DOUBLE)?.unwrap_or_default(),
        })
    }
}

pub fn model() -> Model {
    Model::new()
        .with_entity(Event::schema())
        .with_entity(Reading::schema())
}

pub fn open() -> Arc<Engine> {
    open_with(EngineConfig::default())
}

pub fn open_with(config: EngineConfig) -> Arc<Engine> {
    Engine::open(model(), config).unwrap()
}

/// Events "device 1" .. "device n" with increasing dates.
pub fn put_events(engine: &Arc<Engine>, n: usize) -> Vec<Event> {
    let events = EntityBox::<Event>::new(engine).unwrap();
    (1..=n)
        .map(|i| {
            let mut event = Event {
                device: format!("device {i}"),
                date: 10_000 + i as i64,
                uid: format!("uid-{i}"),
                ..Event::default()
            };
            events.put(&mut event).unwrap();
            event
        })
        .collect()
}

/// Readings whose numeric values are 10000 + i.
pub fn put_readings(engine: &Arc<Engine>, n: usize) -> Vec<Reading> {
    let readings = EntityBox::<Reading>::new(engine).unwrap();
    (1..=n)
        .map(|i| {
            let value = 10_000 + i as i64;
            let mut reading = Reading {
                date: value,
                value_name: format!("reading {i}"),
                value_string: format!("string {i}"),
                value_integer: value,
                value_floating: value as f64,
                value_int32: value as i32,
                value_float32: value as f32,
                ..Reading::default()
            };
            readings.put(&mut reading).unwrap();
            reading
        })
        .collect()
}
