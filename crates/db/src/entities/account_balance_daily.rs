//! `SeaORM` Entity for account_balance_daily table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "account_balance_daily")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub account_number: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub balance_date: Date,
    pub entity_code: String,
    pub category_code: String,
    pub sub_category_code: String,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub opening_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub debit_movement: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub credit_movement: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub closing_balance: Decimal,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
