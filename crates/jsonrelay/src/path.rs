use std::{fmt, sync::Arc};

/// The live position of a value inside a JSON document.
///
/// The root value has the empty path. Keys are shared (`Arc<str>`) so that
/// cloning a path for every callback invocation stays cheap.
pub type Path = Vec<PathItem>;

/// One component of a [`Path`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathItem {
    /// A member key inside a JSON object.
    Key(Arc<str>),
    /// An element index inside a JSON array.
    Index(usize),
}

impl PathItem {
    /// Returns the index if this component is an index, otherwise `None`.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        if let Self::Index(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Returns the key if this component is a key, otherwise `None`.
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        if let Self::Key(k) = self {
            Some(k)
        } else {
            None
        }
    }
}

impl fmt::Display for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathItem::Key(k) => f.write_str(k),
            PathItem::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Renders a path in the same dotted/bracketed notation that patterns use,
/// rooted at `$`.
///
/// ```rust
/// use jsonrelay::{display_path, path};
///
/// assert_eq!(display_path(&path!["keyPoints", 3]), "$.keyPoints[3]");
/// assert_eq!(display_path(&path![]), "$");
/// ```
#[must_use]
pub fn display_path(path: &[PathItem]) -> String {
    let mut out = String::from("$");
    for item in path {
        if let PathItem::Key(_) = item {
            out.push('.');
        }
        out.push_str(&item.to_string());
    }
    out
}

impl From<&str> for PathItem {
    fn from(s: &str) -> Self {
        Self::Key(s.into())
    }
}

impl From<usize> for PathItem {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

#[doc(hidden)]
pub trait PathItemFrom<T> {
    fn from_path_component(value: T) -> PathItem;
}

macro_rules! impl_unsigned_as_path_component {
    ($($t:ty),+) => {
        $(
            impl PathItemFrom<$t> for PathItem {
                fn from_path_component(value: $t) -> Self {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
                    PathItem::Index(value as usize)
                }
            }
        )+
    };
}
impl_unsigned_as_path_component!(u8, u16, u32, u64, usize);

macro_rules! impl_signed_as_path_component {
    ($($t:ty),+) => {
        $(
            impl PathItemFrom<$t> for PathItem {
                fn from_path_component(value: $t) -> Self {
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    PathItem::Index(value.max(0) as usize)
                }
            }
        )+
    };
}
impl_signed_as_path_component!(i8, i16, i32, i64, isize);

impl PathItemFrom<&str> for PathItem {
    fn from_path_component(value: &str) -> Self {
        PathItem::Key(value.into())
    }
}

// Serialized as `["foo", 0, "bar"]` rather than the default tagged form.
#[cfg(any(test, feature = "serde"))]
mod serde_impls {
    use std::fmt;

    use serde::{
        Deserialize, Deserializer, Serialize, Serializer,
        de::{Error, Unexpected, Visitor},
    };

    use super::PathItem;

    impl Serialize for PathItem {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match self {
                PathItem::Key(k) => serializer.serialize_str(k),
                PathItem::Index(i) => serializer.serialize_u64(*i as u64),
            }
        }
    }

    struct PathItemVisitor;

    impl Visitor<'_> for PathItemVisitor {
        type Value = PathItem;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or unsigned integer")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            Ok(PathItem::Key(value.into()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: Error,
        {
            usize::try_from(value)
                .map(PathItem::Index)
                .map_err(|_| Error::invalid_value(Unexpected::Unsigned(value), &"usize index"))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: Error,
        {
            usize::try_from(value)
                .map(PathItem::Index)
                .map_err(|_| Error::invalid_value(Unexpected::Signed(value), &"non-negative index"))
        }
    }

    impl<'de> Deserialize<'de> for PathItem {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(PathItemVisitor)
        }
    }
}
