/// Family postal address
///
/// At most one address per family, keyed by the family id. Only the postal
/// fields are kept; there is no geocoding.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE family_addresses (
///     family_id UUID PRIMARY KEY REFERENCES families(id) ON DELETE CASCADE,
///     street VARCHAR(200) NOT NULL,
///     number VARCHAR(20) NOT NULL,
///     block VARCHAR(20) NOT NULL DEFAULT '',
///     staircase VARCHAR(20) NOT NULL DEFAULT '',
///     floor VARCHAR(20) NOT NULL DEFAULT '',
///     door VARCHAR(20) NOT NULL DEFAULT '',
///     postal_code VARCHAR(20) NOT NULL,
///     city VARCHAR(100) NOT NULL,
///     province VARCHAR(100) NOT NULL,
///     country VARCHAR(100) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FamilyAddress {
    pub family_id: Uuid,
    pub street: String,
    pub number: String,
    pub block: String,
    pub staircase: String,
    pub floor: String,
    pub door: String,
    pub postal_code: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The writable part of an address. Block, staircase, floor and door may be
/// empty; the rest are required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFields {
    pub street: String,
    pub number: String,
    pub block: String,
    pub staircase: String,
    pub floor: String,
    pub door: String,
    pub postal_code: String,
    pub city: String,
    pub province: String,
    pub country: String,
}

impl AddressFields {
    /// Trims every field in place.
    pub fn trim(&mut self) {
        for field in [
            &mut self.street,
            &mut self.number,
            &mut self.block,
            &mut self.staircase,
            &mut self.floor,
            &mut self.door,
            &mut self.postal_code,
            &mut self.city,
            &mut self.province,
            &mut self.country,
        ] {
            *field = field.trim().to_string();
        }
    }

    /// Name of the first required field that is blank.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("street", &self.street),
            ("number", &self.number),
            ("postal_code", &self.postal_code),
            ("city", &self.city),
            ("province", &self.province),
            ("country", &self.country),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

#[derive(sqlx::FromRow)]
struct UpsertedAddress {
    #[sqlx(flatten)]
    address: FamilyAddress,
    inserted: bool,
}

const ADDRESS_COLUMNS: &str = "family_id, street, number, block, staircase, floor, door, \
                               postal_code, city, province, country, created_at, updated_at";

impl FamilyAddress {
    pub async fn find_by_family<'e, E>(executor: E, family_id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, FamilyAddress>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM family_addresses WHERE family_id = $1"
        ))
        .bind(family_id)
        .fetch_optional(executor)
        .await
    }

    /// Inserts or replaces the family's address in one statement. The flag
    /// is true when a new row was created.
    pub async fn upsert<'e, E>(
        executor: E,
        family_id: Uuid,
        fields: AddressFields,
    ) -> Result<(Self, bool), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let row = sqlx::query_as::<_, UpsertedAddress>(&format!(
            "INSERT INTO family_addresses
                 (family_id, street, number, block, staircase, floor, door, postal_code, city, province, country)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (family_id) DO UPDATE
             SET street = EXCLUDED.street, number = EXCLUDED.number, block = EXCLUDED.block,
                 staircase = EXCLUDED.staircase, floor = EXCLUDED.floor, door = EXCLUDED.door,
                 postal_code = EXCLUDED.postal_code, city = EXCLUDED.city,
                 province = EXCLUDED.province, country = EXCLUDED.country, updated_at = NOW()
             RETURNING {ADDRESS_COLUMNS}, (xmax = 0) AS inserted"
        ))
        .bind(family_id)
        .bind(fields.street)
        .bind(fields.number)
        .bind(fields.block)
        .bind(fields.staircase)
        .bind(fields.floor)
        .bind(fields.door)
        .bind(fields.postal_code)
        .bind(fields.city)
        .bind(fields.province)
        .bind(fields.country)
        .fetch_one(executor)
        .await?;

        Ok((row.address, row.inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> AddressFields {
        AddressFields {
            street: " Calle Mayor ".to_string(),
            number: "12".to_string(),
            postal_code: "28013".to_string(),
            city: "Madrid".to_string(),
            province: "Madrid".to_string(),
            country: "España".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_trim() {
        let mut f = fields();
        f.trim();
        assert_eq!(f.street, "Calle Mayor");
    }

    #[test]
    fn test_missing_field_reports_first_blank_required() {
        assert_eq!(fields().missing_field(), None);

        let mut f = fields();
        f.city = "  ".to_string();
        f.country = String::new();
        assert_eq!(f.missing_field(), Some("city"));
    }

    #[test]
    fn test_optional_parts_may_be_empty() {
        let f = fields();
        assert!(f.block.is_empty() && f.door.is_empty());
        assert_eq!(f.missing_field(), None);
    }
}
