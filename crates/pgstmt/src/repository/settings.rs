//! Settings repository.
//!
//! Every kind of setting lives in one `settings` table. The typed attributes are
//! kept in a single `payload` JSONB column and updated through JSON patches, so
//! changing one attribute never rewrites the others.
//!
//! A setting is identified by instance, organization (`NULL` for instance-level
//! settings), type, owner type and state; reads and writes must restrict all of
//! the first four.

use crate::change::{Change, Changes};
use crate::column::Column;
use crate::condition::{Condition, TextOp};
use crate::error::{StmtError, StmtResult};
use crate::insert::{ConflictAction, Insert};
use crate::json::{AttributePatch, PathPatch, bind_attributes, merge_json_patches};
use crate::query::{OrderDirection, QueryOpts};
use crate::repository::Guard;
use crate::row::{FromRow, RowExt};
use crate::statement::Statement;
use crate::table::TableConfig;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_postgres::Row;

/// Kind of a stored setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingType {
    Login,
    Branding,
    PasswordComplexity,
    PasswordExpiry,
    Domain,
    Lockout,
    Security,
    Organization,
    Notification,
    LegalAndSupport,
    SecretGenerator,
}

impl SettingType {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingType::Login => "login",
            SettingType::Branding => "branding",
            SettingType::PasswordComplexity => "password_complexity",
            SettingType::PasswordExpiry => "password_expiry",
            SettingType::Domain => "domain",
            SettingType::Lockout => "lockout",
            SettingType::Security => "security",
            SettingType::Organization => "organization",
            SettingType::Notification => "notification",
            SettingType::LegalAndSupport => "legal_and_support",
            SettingType::SecretGenerator => "secret_generator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "login" => SettingType::Login,
            "branding" => SettingType::Branding,
            "password_complexity" => SettingType::PasswordComplexity,
            "password_expiry" => SettingType::PasswordExpiry,
            "domain" => SettingType::Domain,
            "lockout" => SettingType::Lockout,
            "security" => SettingType::Security,
            "organization" => SettingType::Organization,
            "notification" => SettingType::Notification,
            "legal_and_support" => SettingType::LegalAndSupport,
            "secret_generator" => SettingType::SecretGenerator,
            _ => return None,
        })
    }
}

/// Who owns a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OwnerType {
    #[default]
    Instance,
    Organization,
}

impl OwnerType {
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerType::Instance => "instance",
            OwnerType::Organization => "organization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "instance" => Some(OwnerType::Instance),
            "organization" => Some(OwnerType::Organization),
            _ => None,
        }
    }
}

/// Lifecycle state of a setting. Only branding-like settings use `Preview`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SettingState {
    #[default]
    Active,
    Preview,
}

impl SettingState {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingState::Active => "active",
            SettingState::Preview => "preview",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SettingState::Active),
            "preview" => Some(SettingState::Preview),
            _ => None,
        }
    }
}

/// Columns shared by every setting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettingBase {
    /// Assigned by the database on create.
    pub id: Option<String>,
    pub instance_id: String,
    pub organization_id: Option<String>,
    pub owner_type: OwnerType,
    pub state: SettingState,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A typed settings payload.
///
/// Implementors describe which row they belong to and what goes into the
/// `payload` column; one repository handles all of them.
pub trait SettingsPayload {
    fn setting_type(&self) -> SettingType;

    fn base(&self) -> &SettingBase;

    /// The JSON document stored in `payload`.
    fn attributes(&self) -> StmtResult<serde_json::Value>;
}

/// A setting row with its raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub base: SettingBase,
    pub setting_type: SettingType,
    pub payload: serde_json::Value,
}

impl Setting {
    /// Decode the payload as `T`, checking the stored type first.
    pub fn into_payload<T>(self, expected: SettingType) -> StmtResult<(SettingBase, T)>
    where
        T: for<'de> Deserialize<'de>,
    {
        if self.setting_type != expected {
            return Err(StmtError::validation(format!(
                "Expected a '{}' setting, got '{}'",
                expected.as_str(),
                self.setting_type.as_str()
            )));
        }
        Ok((self.base, serde_json::from_value(self.payload)?))
    }
}

fn parse_column<T>(row: &Row, column: &str, parse: fn(&str) -> Option<T>) -> StmtResult<T> {
    let raw: String = row.try_get_column(column)?;
    parse(&raw).ok_or_else(|| StmtError::decode(column, format!("unknown value '{raw}'")))
}

impl FromRow for Setting {
    fn from_row(row: &Row) -> StmtResult<Self> {
        Ok(Self {
            base: SettingBase {
                id: Some(row.try_get_column("id")?),
                instance_id: row.try_get_column("instance_id")?,
                organization_id: row.try_get_column("organization_id")?,
                owner_type: parse_column(row, "owner_type", OwnerType::parse)?,
                state: parse_column(row, "state", SettingState::parse)?,
                created_at: row.try_get_column("created_at")?,
                updated_at: row.try_get_column("updated_at")?,
            },
            setting_type: parse_column(row, "type", SettingType::parse)?,
            payload: row.try_get_column("payload")?,
        })
    }
}

/// Durations inside payloads are whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_some(&value.as_secs()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
        }
    }
}

fn field(name: &str, value: serde_json::Value) -> Change {
    Change::PathPatch(PathPatch::set_value([name], value))
}

// ---- login ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordlessType {
    #[default]
    NotAllowed,
    Allowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiFactorType {
    U2fWithPin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondFactorType {
    Totp,
    U2f,
    OtpEmail,
    OtpSms,
    RecoveryCodes,
}

/// How users may log in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginSettings {
    #[serde(skip)]
    pub base: SettingBase,

    pub allow_username_password: bool,
    pub allow_register: bool,
    pub allow_external_idp: bool,
    pub force_multi_factor: bool,
    pub force_multi_factor_local_only: bool,
    pub hide_password_reset: bool,
    pub ignore_unknown_usernames: bool,
    pub allow_domain_discovery: bool,
    pub disable_login_with_email: bool,
    pub disable_login_with_phone: bool,
    pub passwordless_type: PasswordlessType,
    pub default_redirect_uri: String,
    #[serde(with = "duration_secs")]
    pub password_check_lifetime: Duration,
    #[serde(with = "duration_secs")]
    pub external_login_check_lifetime: Duration,
    #[serde(with = "duration_secs")]
    pub multi_factor_init_skip_lifetime: Duration,
    #[serde(with = "duration_secs")]
    pub second_factor_check_lifetime: Duration,
    #[serde(with = "duration_secs")]
    pub multi_factor_check_lifetime: Duration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub multi_factor_types: Vec<MultiFactorType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub second_factor_types: Vec<SecondFactorType>,
}

impl SettingsPayload for LoginSettings {
    fn setting_type(&self) -> SettingType {
        SettingType::Login
    }

    fn base(&self) -> &SettingBase {
        &self.base
    }

    fn attributes(&self) -> StmtResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl LoginSettings {
    pub fn set_allow_username_password(value: bool) -> Change {
        field("allowUsernamePassword", value.into())
    }

    pub fn set_allow_register(value: bool) -> Change {
        field("allowRegister", value.into())
    }

    pub fn set_allow_external_idp(value: bool) -> Change {
        field("allowExternalIdp", value.into())
    }

    pub fn set_force_multi_factor(value: bool) -> Change {
        field("forceMultiFactor", value.into())
    }

    pub fn set_force_multi_factor_local_only(value: bool) -> Change {
        field("forceMultiFactorLocalOnly", value.into())
    }

    pub fn set_hide_password_reset(value: bool) -> Change {
        field("hidePasswordReset", value.into())
    }

    pub fn set_ignore_unknown_usernames(value: bool) -> Change {
        field("ignoreUnknownUsernames", value.into())
    }

    pub fn set_allow_domain_discovery(value: bool) -> Change {
        field("allowDomainDiscovery", value.into())
    }

    pub fn set_disable_login_with_email(value: bool) -> Change {
        field("disableLoginWithEmail", value.into())
    }

    pub fn set_disable_login_with_phone(value: bool) -> Change {
        field("disableLoginWithPhone", value.into())
    }

    pub fn set_passwordless_type(value: PasswordlessType) -> Change {
        let value = match value {
            PasswordlessType::NotAllowed => "not_allowed",
            PasswordlessType::Allowed => "allowed",
        };
        field("passwordlessType", value.into())
    }

    pub fn set_default_redirect_uri(value: impl Into<String>) -> Change {
        field("defaultRedirectUri", serde_json::Value::String(value.into()))
    }

    pub fn set_password_check_lifetime(value: Duration) -> Change {
        field("passwordCheckLifetime", value.as_secs().into())
    }

    pub fn set_external_login_check_lifetime(value: Duration) -> Change {
        field("externalLoginCheckLifetime", value.as_secs().into())
    }

    pub fn set_multi_factor_init_skip_lifetime(value: Duration) -> Change {
        field("multiFactorInitSkipLifetime", value.as_secs().into())
    }

    pub fn set_second_factor_check_lifetime(value: Duration) -> Change {
        field("secondFactorCheckLifetime", value.as_secs().into())
    }

    pub fn set_multi_factor_check_lifetime(value: Duration) -> Change {
        field("multiFactorCheckLifetime", value.as_secs().into())
    }

    pub fn set_second_factor_types(value: &[SecondFactorType]) -> StmtResult<Change> {
        Ok(PathPatch::set(["secondFactorTypes"], &value)?.into())
    }
}

// ---- lockout ----

/// When accounts get locked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockoutSettings {
    #[serde(skip)]
    pub base: SettingBase,

    /// Zero disables the lockout.
    pub max_password_attempts: u64,
    pub max_otp_attempts: u64,
    pub show_lockout_failures: bool,
}

impl SettingsPayload for LockoutSettings {
    fn setting_type(&self) -> SettingType {
        SettingType::Lockout
    }

    fn base(&self) -> &SettingBase {
        &self.base
    }

    fn attributes(&self) -> StmtResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl LockoutSettings {
    pub fn set_max_password_attempts(value: u64) -> Change {
        field("maxPasswordAttempts", value.into())
    }

    pub fn set_max_otp_attempts(value: u64) -> Change {
        field("maxOtpAttempts", value.into())
    }

    pub fn set_show_lockout_failures(value: bool) -> Change {
        field("showLockoutFailures", value.into())
    }
}

// ---- secret generators ----

/// The secrets a [`SecretGeneratorSettings`] configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretGeneratorType {
    ClientSecret,
    InitializeUserCode,
    EmailVerificationCode,
    PhoneVerificationCode,
    PasswordVerificationCode,
    PasswordlessInitCode,
    DomainVerification,
    OtpSms,
    OtpEmail,
    PasswordResetCode,
    AppSecret,
    InviteCode,
    SigningKey,
}

impl SecretGeneratorType {
    pub const ALL: [SecretGeneratorType; 13] = [
        SecretGeneratorType::ClientSecret,
        SecretGeneratorType::InitializeUserCode,
        SecretGeneratorType::EmailVerificationCode,
        SecretGeneratorType::PhoneVerificationCode,
        SecretGeneratorType::PasswordVerificationCode,
        SecretGeneratorType::PasswordlessInitCode,
        SecretGeneratorType::DomainVerification,
        SecretGeneratorType::OtpSms,
        SecretGeneratorType::OtpEmail,
        SecretGeneratorType::PasswordResetCode,
        SecretGeneratorType::AppSecret,
        SecretGeneratorType::InviteCode,
        SecretGeneratorType::SigningKey,
    ];

    /// Key of this generator's object inside the payload.
    pub fn path_prefix(self) -> &'static str {
        match self {
            SecretGeneratorType::ClientSecret => "clientSecret",
            SecretGeneratorType::InitializeUserCode => "initializeUserCode",
            SecretGeneratorType::EmailVerificationCode => "emailVerificationCode",
            SecretGeneratorType::PhoneVerificationCode => "phoneVerificationCode",
            SecretGeneratorType::PasswordVerificationCode => "passwordVerificationCode",
            SecretGeneratorType::PasswordlessInitCode => "passwordlessInitCode",
            SecretGeneratorType::DomainVerification => "domainVerification",
            SecretGeneratorType::OtpSms => "otpSms",
            SecretGeneratorType::OtpEmail => "otpEmail",
            SecretGeneratorType::PasswordResetCode => "passwordResetCode",
            SecretGeneratorType::AppSecret => "appSecret",
            SecretGeneratorType::InviteCode => "inviteCode",
            SecretGeneratorType::SigningKey => "signingKey",
        }
    }
}

/// Shape of one generated secret.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretGeneratorAttrs {
    pub length: u32,
    pub include_lower_letters: bool,
    pub include_upper_letters: bool,
    pub include_digits: bool,
    pub include_symbols: bool,
    /// Not every generator expires (domain verification does not).
    #[serde(with = "duration_secs::option", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Duration>,
}

impl SecretGeneratorAttrs {
    pub fn set_length(value: u32) -> Change {
        AttributePatch::set(["length"], value.into()).into()
    }

    pub fn set_include_lower_letters(value: bool) -> Change {
        AttributePatch::set(["includeLowerLetters"], value.into()).into()
    }

    pub fn set_include_upper_letters(value: bool) -> Change {
        AttributePatch::set(["includeUpperLetters"], value.into()).into()
    }

    pub fn set_include_digits(value: bool) -> Change {
        AttributePatch::set(["includeDigits"], value.into()).into()
    }

    pub fn set_include_symbols(value: bool) -> Change {
        AttributePatch::set(["includeSymbols"], value.into()).into()
    }

    pub fn set_expiry(value: Option<Duration>) -> Change {
        match value {
            Some(value) => AttributePatch::set(["expiry"], value.as_secs().into()).into(),
            None => AttributePatch::remove(["expiry"]).into(),
        }
    }

    /// Attribute changes reproducing every field of `self`.
    pub fn changes(&self) -> Changes {
        Changes::from(vec![
            Self::set_length(self.length),
            Self::set_include_lower_letters(self.include_lower_letters),
            Self::set_include_upper_letters(self.include_upper_letters),
            Self::set_include_digits(self.include_digits),
            Self::set_include_symbols(self.include_symbols),
            Self::set_expiry(self.expiry),
        ])
    }
}

/// Secret generator configuration, one optional entry per generator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretGeneratorSettings {
    #[serde(skip)]
    pub base: SettingBase,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialize_user_code: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verification_code: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_verification_code: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_verification_code: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passwordless_init_code: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_verification: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_sms: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_email: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_reset_code: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<SecretGeneratorAttrs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<SecretGeneratorAttrs>,
}

impl SettingsPayload for SecretGeneratorSettings {
    fn setting_type(&self) -> SettingType {
        SettingType::SecretGenerator
    }

    fn base(&self) -> &SettingBase {
        &self.base
    }

    fn attributes(&self) -> StmtResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl SecretGeneratorSettings {
    pub fn generator(&self, generator: SecretGeneratorType) -> Option<&SecretGeneratorAttrs> {
        match generator {
            SecretGeneratorType::ClientSecret => self.client_secret.as_ref(),
            SecretGeneratorType::InitializeUserCode => self.initialize_user_code.as_ref(),
            SecretGeneratorType::EmailVerificationCode => self.email_verification_code.as_ref(),
            SecretGeneratorType::PhoneVerificationCode => self.phone_verification_code.as_ref(),
            SecretGeneratorType::PasswordVerificationCode => self.password_verification_code.as_ref(),
            SecretGeneratorType::PasswordlessInitCode => self.passwordless_init_code.as_ref(),
            SecretGeneratorType::DomainVerification => self.domain_verification.as_ref(),
            SecretGeneratorType::OtpSms => self.otp_sms.as_ref(),
            SecretGeneratorType::OtpEmail => self.otp_email.as_ref(),
            SecretGeneratorType::PasswordResetCode => self.password_reset_code.as_ref(),
            SecretGeneratorType::AppSecret => self.app_secret.as_ref(),
            SecretGeneratorType::InviteCode => self.invite_code.as_ref(),
            SecretGeneratorType::SigningKey => self.signing_key.as_ref(),
        }
    }

    /// Bind generator attribute changes (built with the [`SecretGeneratorAttrs`]
    /// setters) to `generator`'s object.
    ///
    /// The object must already exist in the payload; use
    /// [`SecretGeneratorSettings::set_generator`] to create it.
    pub fn set_generator_attributes(generator: SecretGeneratorType, changes: impl Into<Changes>) -> Change {
        Change::Group(bind_attributes(&[generator.path_prefix()], changes.into()))
    }

    /// Replace `generator`'s whole object.
    pub fn set_generator(generator: SecretGeneratorType, attrs: &SecretGeneratorAttrs) -> StmtResult<Change> {
        Ok(PathPatch::set([generator.path_prefix()], attrs)?.into())
    }

    /// Remove `generator`'s object.
    pub fn remove_generator(generator: SecretGeneratorType) -> Change {
        PathPatch::remove([generator.path_prefix()]).into()
    }
}

/// The settings table.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    /// Tenant only; used for listing and bulk deletes.
    tenant: Guard,
    /// Instance, organization, type and owner type.
    unique: Guard,
}

impl SettingsRepository {
    /// Repository over `<schema>.settings`.
    pub fn new(schema: &str) -> StmtResult<Self> {
        let table = TableConfig::new(schema, "settings")?
            .tenant_column("instance_id")?
            .primary_key(["instance_id", "id"])?;
        Ok(Self::with_table(table))
    }

    pub fn with_table(table: TableConfig) -> Self {
        let tenant = Guard::new(table);
        let unique = tenant.clone().mandatory([
            tenant.table().column("organization_id"),
            tenant.table().column("type"),
            tenant.table().column("owner_type"),
        ]);
        Self { tenant, unique }
    }

    pub fn table(&self) -> &TableConfig {
        self.tenant.table()
    }

    // ---- columns ----

    pub fn id_column(&self) -> Column {
        self.table().column("id")
    }

    pub fn instance_id_column(&self) -> Column {
        self.table().column("instance_id")
    }

    pub fn organization_id_column(&self) -> Column {
        self.table().column("organization_id")
    }

    pub fn type_column(&self) -> Column {
        self.table().column("type")
    }

    pub fn owner_type_column(&self) -> Column {
        self.table().column("owner_type")
    }

    pub fn state_column(&self) -> Column {
        self.table().column("state")
    }

    pub fn payload_column(&self) -> Column {
        self.table().column("payload")
    }

    pub fn created_at_column(&self) -> Column {
        self.table().column("created_at")
    }

    pub fn updated_at_column(&self) -> Column {
        self.table().column("updated_at")
    }

    // ---- conditions ----

    pub fn id_condition(&self, id: &str) -> Condition {
        Condition::text(self.id_column(), TextOp::Equal, id)
    }

    pub fn instance_id_condition(&self, instance_id: &str) -> Condition {
        Condition::text(self.instance_id_column(), TextOp::Equal, instance_id)
    }

    /// `organization_id = $n`, or `organization_id IS NULL` for instance-level settings.
    pub fn organization_id_condition(&self, organization_id: Option<&str>) -> Condition {
        match organization_id {
            Some(id) => Condition::text(self.organization_id_column(), TextOp::Equal, id),
            None => Condition::is_null(self.organization_id_column()),
        }
    }

    pub fn type_condition(&self, setting_type: SettingType) -> Condition {
        Condition::text(self.type_column(), TextOp::Equal, setting_type.as_str())
    }

    pub fn owner_type_condition(&self, owner_type: OwnerType) -> Condition {
        Condition::text(self.owner_type_column(), TextOp::Equal, owner_type.as_str())
    }

    pub fn state_condition(&self, state: SettingState) -> Condition {
        Condition::text(self.state_column(), TextOp::Equal, state.as_str())
    }

    /// The condition identifying exactly one setting.
    pub fn unique_condition(
        &self,
        instance_id: &str,
        organization_id: Option<&str>,
        setting_type: SettingType,
        owner_type: OwnerType,
        state: SettingState,
    ) -> Condition {
        Condition::and([
            self.instance_id_condition(instance_id),
            self.organization_id_condition(organization_id),
            self.type_condition(setting_type),
            self.owner_type_condition(owner_type),
            self.state_condition(state),
        ])
    }

    // ---- changes ----

    pub fn set_state(&self, state: SettingState) -> Change {
        Change::set(self.state_column(), state.as_str())
    }

    pub fn set_updated_at(&self, updated_at: DateTime<Utc>) -> Change {
        Change::set(self.updated_at_column(), updated_at)
    }

    /// Fold every payload patch in `changes` into one change of the payload column.
    /// Other changes pass through in order. [`SettingsRepository::update`] does
    /// this itself.
    pub fn set_attributes(&self, changes: impl Into<Changes>) -> Changes {
        merge_json_patches(&self.payload_column(), changes.into())
    }

    // ---- statements ----

    /// Insert a setting, or replace the payload of the existing one.
    pub fn create(&self, setting: &dyn SettingsPayload) -> StmtResult<Statement> {
        let base = setting.base();
        let payload = self.payload_column();
        Insert::new(self.table())
            .value(self.instance_id_column(), Value::bind(base.instance_id.clone()))
            .value(self.organization_id_column(), Value::bind_opt(base.organization_id.clone()))
            .value(self.type_column(), Value::bind(setting.setting_type().as_str()))
            .value(self.owner_type_column(), Value::bind(base.owner_type.as_str()))
            .value(self.state_column(), Value::bind(base.state.as_str()))
            .value(payload.clone(), Value::bind(setting.attributes()?))
            .value(self.created_at_column(), Value::bind_or_default(base.created_at))
            .value(self.updated_at_column(), Value::bind_or_default(base.updated_at))
            .on_conflict(
                [
                    self.instance_id_column(),
                    self.organization_id_column(),
                    self.type_column(),
                    self.owner_type_column(),
                    self.state_column(),
                ],
                ConflictAction::DoUpdate(Changes::from(vec![
                    Change::set_value(payload.clone(), Value::Excluded(payload)),
                    Change::set_now(self.updated_at_column()),
                ])),
            )
            .returning(["id", "created_at", "updated_at"])
            .build()
    }

    fn select_base(&self) -> String {
        format!(
            "SELECT id, instance_id, organization_id, type, owner_type, state, payload, created_at, updated_at FROM {}",
            self.table().qualified_name()
        )
    }

    /// Read one setting.
    pub fn get(&self, opts: QueryOpts) -> StmtResult<Statement> {
        self.unique.select(&self.select_base(), &opts.limit(1))
    }

    /// Read settings of an instance, oldest first.
    pub fn list(&self, opts: QueryOpts) -> StmtResult<Statement> {
        let opts = opts.order_by(self.created_at_column(), OrderDirection::Asc);
        self.tenant.select(&self.select_base(), &opts)
    }

    /// Update one setting. Payload patches anywhere in `changes`, including
    /// already merged ones, end up in a single `payload` assignment.
    pub fn update(&self, condition: &Condition, changes: impl Into<Changes>) -> StmtResult<Statement> {
        let changes = merge_json_patches(&self.payload_column(), changes.into());
        self.unique.update(condition, changes)
    }

    pub fn delete(&self, condition: &Condition) -> StmtResult<Statement> {
        self.unique.delete(condition)
    }

    /// Delete every setting of an instance.
    pub fn delete_for_instance(&self, instance_id: &str) -> StmtResult<Statement> {
        self.tenant.delete(&self.instance_id_condition(instance_id))
    }

    /// Delete every setting of an organization.
    pub fn delete_for_organization(&self, instance_id: &str, organization_id: &str) -> StmtResult<Statement> {
        if organization_id.is_empty() {
            return Err(StmtError::validation("Organization id must not be empty"));
        }
        self.tenant.delete(&Condition::and([
            self.instance_id_condition(instance_id),
            self.organization_id_condition(Some(organization_id)),
        ]))
    }
}
