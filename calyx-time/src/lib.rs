//! Unsigned time management
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod error;
pub use error::TimeError;
use calyx_serialization::{Deserializer, Serializer, U64VarIntDeserializer, U64VarIntSerializer};
use nom::error::{context, ContextError, ParseError};
use nom::IResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time structure used everywhere.
/// milliseconds since 01/01/1970.
/// Also used to carry durations (sweeper cadence, execution budgets).
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalyxTime(u64);

impl fmt::Display for CalyxTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_millis())
    }
}

impl TryFrom<Duration> for CalyxTime {
    type Error = TimeError;

    /// Conversion from `std::time::Duration`.
    /// ```
    /// # use std::time::Duration;
    /// # use calyx_time::*;
    /// # use std::convert::TryFrom;
    /// let duration: Duration = Duration::from_millis(42);
    /// let time : CalyxTime = CalyxTime::from_millis(42);
    /// assert_eq!(time, CalyxTime::try_from(duration).unwrap());
    /// ```
    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Ok(CalyxTime(
            value
                .as_millis()
                .try_into()
                .map_err(|_| TimeError::ConversionError)?,
        ))
    }
}

impl From<CalyxTime> for Duration {
    fn from(value: CalyxTime) -> Self {
        value.to_duration()
    }
}

impl FromStr for CalyxTime {
    type Err = crate::TimeError;

    /// Conversion from `&str`.
    ///
    /// ```
    /// # use calyx_time::*;
    /// # use std::str::FromStr;
    /// let duration: &str = "42";
    /// let time : CalyxTime = CalyxTime::from_millis(42);
    ///
    /// assert_eq!(time, CalyxTime::from_str(duration).unwrap());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CalyxTime(
            u64::from_str(s).map_err(|_| Self::Err::ConversionError)?,
        ))
    }
}

impl CalyxTime {
    /// Conversion from `u64`, representing timestamp in milliseconds.
    /// ```
    /// # use calyx_time::*;
    /// let time : CalyxTime = CalyxTime::from_millis(42);
    /// ```
    pub const fn from_millis(value: u64) -> Self {
        CalyxTime(value)
    }

    /// Smallest time interval
    pub const EPSILON: CalyxTime = CalyxTime(1);

    /// Gets current UNIX timestamp (resolution: milliseconds).
    pub fn now() -> Result<Self, TimeError> {
        let now: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TimeError::TimeOverflowError)?
            .as_millis()
            .try_into()
            .map_err(|_| TimeError::TimeOverflowError)?;
        Ok(CalyxTime(now))
    }

    /// Conversion to `std::time::Duration`.
    /// ```
    /// # use std::time::Duration;
    /// # use calyx_time::*;
    /// let duration: Duration = Duration::from_millis(42);
    /// let time : CalyxTime = CalyxTime::from_millis(42);
    /// let res: Duration = time.to_duration();
    /// assert_eq!(res, duration);
    /// ```
    pub fn to_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Conversion to `u64`, representing milliseconds.
    /// ```
    /// # use calyx_time::*;
    /// let time : CalyxTime = CalyxTime::from_millis(42);
    /// let res: u64 = time.to_millis();
    /// assert_eq!(res, 42);
    /// ```
    pub const fn to_millis(&self) -> u64 {
        self.0
    }

    /// ```
    /// # use calyx_time::*;
    /// let time_1 : CalyxTime = CalyxTime::from_millis(42);
    /// let time_2 : CalyxTime = CalyxTime::from_millis(7);
    /// let res : CalyxTime = time_1.saturating_sub(time_2);
    /// assert_eq!(res, CalyxTime::from_millis(42-7))
    /// ```
    #[must_use]
    pub fn saturating_sub(self, t: CalyxTime) -> Self {
        CalyxTime(self.0.saturating_sub(t.0))
    }

    /// ```
    /// # use calyx_time::*;
    /// let time_1 : CalyxTime = CalyxTime::from_millis(42);
    /// let time_2 : CalyxTime = CalyxTime::from_millis(7);
    /// let res : CalyxTime = time_1.saturating_add(time_2);
    /// assert_eq!(res, CalyxTime::from_millis(42+7))
    /// ```
    #[must_use]
    pub fn saturating_add(self, t: CalyxTime) -> Self {
        CalyxTime(self.0.saturating_add(t.0))
    }

    /// ```
    /// # use calyx_time::*;
    /// let time_1 : CalyxTime = CalyxTime::from_millis(42);
    /// let time_2 : CalyxTime = CalyxTime::from_millis(7);
    /// let res : CalyxTime = time_1.checked_sub(time_2).unwrap();
    /// assert_eq!(res, CalyxTime::from_millis(42-7))
    /// ```
    pub fn checked_sub(self, t: CalyxTime) -> Result<Self, TimeError> {
        self.0
            .checked_sub(t.0)
            .ok_or_else(|| TimeError::CheckedOperationError("subtraction error".to_string()))
            .map(CalyxTime)
    }

    /// ```
    /// # use calyx_time::*;
    /// let time_1 : CalyxTime = CalyxTime::from_millis(42);
    /// let time_2 : CalyxTime = CalyxTime::from_millis(7);
    /// let res : CalyxTime = time_1.checked_add(time_2).unwrap();
    /// assert_eq!(res, CalyxTime::from_millis(42+7))
    /// ```
    pub fn checked_add(self, t: CalyxTime) -> Result<Self, TimeError> {
        self.0
            .checked_add(t.0)
            .ok_or_else(|| TimeError::CheckedOperationError("addition error".to_string()))
            .map(CalyxTime)
    }
}

/// Serializer for `CalyxTime`
pub struct CalyxTimeSerializer {
    u64_serializer: U64VarIntSerializer,
}

impl CalyxTimeSerializer {
    /// Creates a `CalyxTimeSerializer`
    pub fn new() -> Self {
        Self {
            u64_serializer: U64VarIntSerializer::new(),
        }
    }
}

impl Default for CalyxTimeSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer<CalyxTime> for CalyxTimeSerializer {
    /// ```
    /// use calyx_serialization::Serializer;
    /// use calyx_time::{CalyxTime, CalyxTimeSerializer};
    ///
    /// let time: CalyxTime = CalyxTime::from_millis(30);
    /// let mut serialized = Vec::new();
    /// let serializer = CalyxTimeSerializer::new();
    /// serializer.serialize(&time, &mut serialized).unwrap();
    /// ```
    fn serialize(
        &self,
        value: &CalyxTime,
        buffer: &mut Vec<u8>,
    ) -> Result<(), calyx_serialization::SerializeError> {
        self.u64_serializer.serialize(&value.to_millis(), buffer)
    }
}

/// Deserializer for `CalyxTime`
pub struct CalyxTimeDeserializer {
    u64_deserializer: U64VarIntDeserializer,
}

impl CalyxTimeDeserializer {
    /// Creates a `CalyxTimeDeserializer`
    ///
    /// Arguments:
    /// * range: bounds for the time to deserialize
    pub fn new(range: (Bound<CalyxTime>, Bound<CalyxTime>)) -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(
                range.0.map(|time| time.to_millis()),
                range.1.map(|time| time.to_millis()),
            ),
        }
    }
}

impl Deserializer<CalyxTime> for CalyxTimeDeserializer {
    /// ```
    /// use std::ops::Bound::Included;
    /// use calyx_serialization::{Serializer, Deserializer, DeserializeError};
    /// use calyx_time::{CalyxTime, CalyxTimeSerializer, CalyxTimeDeserializer};
    ///
    /// let time: CalyxTime = CalyxTime::from_millis(30);
    /// let mut serialized = Vec::new();
    /// let serializer = CalyxTimeSerializer::new();
    /// let deserializer = CalyxTimeDeserializer::new((Included(CalyxTime::from_millis(0)), Included(CalyxTime::from_millis(u64::MAX))));
    /// serializer.serialize(&time, &mut serialized).unwrap();
    /// let (rest, time_deser) = deserializer.deserialize::<DeserializeError>(&serialized).unwrap();
    /// assert!(rest.is_empty());
    /// assert_eq!(time, time_deser);
    /// ```
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], CalyxTime, E> {
        context("Failed CalyxTime deserialization", |input| {
            self.u64_deserializer
                .deserialize(input)
                .map(|(rest, res)| (rest, CalyxTime::from_millis(res)))
        })(buffer)
    }
}
