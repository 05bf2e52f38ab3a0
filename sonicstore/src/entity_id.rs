// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

#![allow(unreachable_pub, reason = "types are generated at the call site")]

/// Macro for defining type-safe entity ID wrappers for _SQLx_.
///
/// Entity IDs are opaque strings. The generated newtype is stored as
/// `TEXT` and prevents mixing up IDs of different entity types, e.g.
/// passing an album ID where a media file ID is expected.
#[allow(clippy::doc_markdown, reason = "SQLx")]
#[macro_export]
macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Checks if the ID is valid.
            ///
            /// Empty IDs never occur in a table.
            #[must_use]
            pub const fn is_valid(&self) -> bool {
                !self.0.is_empty()
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        // Encoded and decoded as the inner string.
        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> ::std::result::Result<Self, sqlx::error::BoxDynError> {
                let value = <String as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
                Ok(Self(value))
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> ::std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <String as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    entity_id!(TestId);

    mod with_result_alias {
        use crate::Result;

        crate::entity_id!(AliasedId);

        pub(super) fn parse(id: &str) -> Result<AliasedId> {
            Ok(AliasedId::new(id))
        }
    }

    #[tokio::test]
    async fn expands_next_to_result_alias() {
        let id = with_result_alias::parse("abc").unwrap();
        let pool = crate::test_util::pool().await;
        let decoded: with_result_alias::AliasedId = sqlx::query_scalar("SELECT ?1")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn is_valid() {
        assert!(!TestId::default().is_valid());
        assert!(!TestId::new("").is_valid());
        assert!(TestId::new("a").is_valid());
    }

    #[test]
    fn display_is_transparent() {
        assert_eq!(TestId::from("abc-123").to_string(), "abc-123");
    }
}
