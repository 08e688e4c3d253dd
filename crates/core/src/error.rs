//! Error types for change tracking
//!
//! Every failure in the workspace is a variant of [`Error`]. Messages are
//! complete sentences naming the entity type and property involved. Key
//! values are only included when the caller passes them in, which the
//! tracker does only when sensitive-data logging is enabled.

use thiserror::Error;

/// Result type alias for change-tracking operations
pub type Result<T> = std::result::Result<T, Error>;

fn key_suffix(key_values: &Option<String>) -> String {
    match key_values {
        Some(k) => format!(" '{}'", k),
        None => String::new(),
    }
}

fn sensitive_hint(key_values: &Option<String>) -> &'static str {
    if key_values.is_some() {
        ""
    } else {
        " Enable sensitive-data logging to see the key values."
    }
}

/// Broad category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer error: wrong accessor, missing key, bad enum value
    Configuration,
    /// The tracked graph would become inconsistent
    GraphConsistency,
    /// Detected when committing
    PersistencePrecondition,
    /// Original values requested but not kept
    OriginalValue,
    /// Configuration files and store failures
    Environment,
}

/// Error types for the change tracker
#[derive(Debug, Error)]
pub enum Error {
    // ------------------------------------------------------------------
    // Configuration / identity
    // ------------------------------------------------------------------
    /// A keyless entity type was handed to the tracker
    #[error("Unable to track an instance of type '{entity_type}' because it does not have a primary key. Only entity types with a primary key may be tracked.")]
    KeylessTypeTracked {
        /// Entity type name
        entity_type: String,
    },

    /// A state-changing operation was invoked on a keyless entity type
    #[error("The invoked operation cannot be used for the entity type '{entity_type}' because it does not have a primary key.")]
    InvalidSetKeylessOperation {
        /// Entity type name
        entity_type: String,
    },

    /// Entity type name not present in the model
    #[error("The entity type '{entity_type}' was not found. Ensure that the entity type has been added to the model.")]
    EntityTypeNotFound {
        /// Entity type name
        entity_type: String,
    },

    /// Property name not present on the entity type
    #[error("The property '{entity_type}.{property}' could not be found. Ensure that the property exists and has been included in the model.")]
    PropertyNotFound {
        /// Property name
        property: String,
        /// Entity type name
        entity_type: String,
    },

    /// Complex property name not present on the entity type
    #[error("The complex property '{entity_type}.{property}' could not be found. Ensure that the property exists and has been included in the model as a complex property.")]
    ComplexPropertyNotFound {
        /// Complex property path
        property: String,
        /// Entity type name
        entity_type: String,
    },

    /// Navigation name not present on the entity type
    #[error("The navigation '{entity_type}.{navigation}' could not be found. Ensure that the navigation exists and has been included in the model.")]
    NavigationNotFound {
        /// Navigation name
        navigation: String,
        /// Entity type name
        entity_type: String,
    },

    /// A scalar property was requested through a navigation accessor
    #[error("The property '{entity_type}.{property}' is being accessed as a navigation, but is defined in the model as a non-navigation property. Use the property accessor to access non-navigation properties.")]
    NavigationIsProperty {
        /// Property name
        property: String,
        /// Entity type name
        entity_type: String,
    },

    /// A navigation was requested through the scalar property accessor
    #[error("The property '{entity_type}.{property}' is being accessed as a scalar property, but is defined in the model as a navigation. Use the reference or collection accessor to access navigations.")]
    PropertyIsNavigation {
        /// Navigation name
        property: String,
        /// Entity type name
        entity_type: String,
    },

    /// A collection navigation was requested through the reference accessor
    #[error("The property '{entity_type}.{navigation}' is being accessed as a reference navigation, but is defined in the model as a collection navigation. Use the collection accessor to access collection navigations.")]
    ReferenceIsCollection {
        /// Navigation name
        navigation: String,
        /// Entity type name
        entity_type: String,
    },

    /// A reference navigation was requested through the collection accessor
    #[error("The property '{entity_type}.{navigation}' is being accessed as a collection navigation, but is defined in the model as a reference navigation. Use the reference accessor to access reference navigations.")]
    CollectionIsReference {
        /// Navigation name
        navigation: String,
        /// Entity type name
        entity_type: String,
    },

    /// Typed access or assignment used the wrong value kind
    #[error("The property '{entity_type}.{property}' is of type '{actual}' but is being accessed as '{expected}'.")]
    WrongGenericPropertyType {
        /// Property name
        property: String,
        /// Entity type name
        entity_type: String,
        /// Declared kind of the property
        actual: String,
        /// Kind used by the caller
        expected: String,
    },

    /// A raw value does not map to any variant of an enum
    #[error("The value '{value}' is not a valid value for the enum '{enum_type}'.")]
    InvalidEnumValue {
        /// Rejected raw value
        value: String,
        /// Enum name
        enum_type: &'static str,
    },

    /// An instance had to be created for a type without a parameterless constructor
    #[error("The entity type '{entity_type}' does not have a parameterless constructor, so a new instance cannot be created from its property values.")]
    NoParameterlessConstructor {
        /// Entity type name
        entity_type: String,
    },

    /// A primary key property of a tracked entity was marked modified
    #[error("The property '{entity_type}.{property}' is part of a key and so cannot be modified or marked as modified. To change the principal of an existing entity with an identifying foreign key, first delete the dependent and then attach a new dependent.")]
    KeyReadOnly {
        /// Property name
        property: String,
        /// Entity type name
        entity_type: String,
    },

    /// Metadata is internally inconsistent
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    // ------------------------------------------------------------------
    // Graph consistency
    // ------------------------------------------------------------------
    /// Two instances with the same key in one registry
    #[error("The instance of entity type '{entity_type}' cannot be tracked because another instance with the key value{} is already being tracked. When attaching existing entities, ensure that only one entity instance with a given key value is attached.{}", key_suffix(.key_values), sensitive_hint(.key_values))]
    IdentityConflict {
        /// Entity type name
        entity_type: String,
        /// Formatted key, present only with sensitive-data logging
        key_values: Option<String>,
    },

    /// Identity resolution would substitute an instance of another type
    #[error("The instance of entity type '{runtime_type}' cannot be tracked as the entity type '{entity_type}' because the two types are not compatible within an ownership relationship.")]
    TrackingTypeMismatch {
        /// Type of the incoming instance
        runtime_type: String,
        /// Type of the already tracked instance
        entity_type: String,
    },

    // ------------------------------------------------------------------
    // Persistence preconditions
    // ------------------------------------------------------------------
    /// A key still holds a temporary value with no principal to supply the real one
    #[error("Unable to save changes because the value of property '{entity_type}.{property}' is unknown. The property holds a temporary value generated for a principal that is not being tracked.")]
    UnknownKeyValue {
        /// Entity type name
        entity_type: String,
        /// Property name
        property: String,
    },

    /// An owned entity was saved without its owner
    #[error("The entity of type '{entity_type}' is sharing a table with its owner but there is no tracked owner for it. Owned entities cannot be saved without their owner.")]
    SaveOwnedWithoutOwner {
        /// Owned entity type name
        entity_type: String,
    },

    /// A required relationship was severed and the orphan was not resolved
    #[error("The association between entity types '{principal_type}' and '{dependent_type}' has been severed, but the relationship is marked as required. When a required relationship is severed, the dependent entity should be deleted instead of having its foreign key set to null.{}{}", dependent_key(.key_values), sensitive_hint(.key_values))]
    RelationshipConceptualNull {
        /// Principal entity type name
        principal_type: String,
        /// Dependent entity type name
        dependent_type: String,
        /// Formatted dependent key, present only with sensitive-data logging
        key_values: Option<String>,
    },

    // ------------------------------------------------------------------
    // Original values
    // ------------------------------------------------------------------
    /// The change-tracking strategy does not keep originals
    #[error("The original value for property '{entity_type}.{property}' cannot be accessed because it is not being tracked. Original values are not recorded for entity types using a notification strategy without original values.")]
    OriginalValueNotTracked {
        /// Property name
        property: String,
        /// Entity type name
        entity_type: String,
    },

    // ------------------------------------------------------------------
    // Environment
    // ------------------------------------------------------------------
    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store rejected a write batch
    #[error("Storage error: {0}")]
    Storage(String),

    /// A row expected by an update or delete is missing from the store
    #[error("The database operation was expected to affect 1 row for entity type '{entity_type}' but affected 0 rows.{}", dependent_key(.key_values))]
    ConcurrencyConflict {
        /// Entity type name
        entity_type: String,
        /// Formatted key, present only with sensitive-data logging
        key_values: Option<String>,
    },
}

fn dependent_key(key_values: &Option<String>) -> String {
    match key_values {
        Some(k) => format!(" Key: {}.", k),
        None => String::new(),
    }
}

impl Error {
    /// Category of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IdentityConflict { .. } | Error::TrackingTypeMismatch { .. } => {
                ErrorKind::GraphConsistency
            }
            Error::UnknownKeyValue { .. }
            | Error::SaveOwnedWithoutOwner { .. }
            | Error::RelationshipConceptualNull { .. } => ErrorKind::PersistencePrecondition,
            Error::OriginalValueNotTracked { .. } => ErrorKind::OriginalValue,
            Error::Config(_) | Error::Storage(_) | Error::ConcurrencyConflict { .. } => {
                ErrorKind::Environment
            }
            _ => ErrorKind::Configuration,
        }
    }

    /// Shorthand for [`Error::PropertyNotFound`]
    pub fn property_not_found(property: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Error::PropertyNotFound {
            property: property.into(),
            entity_type: entity_type.into(),
        }
    }

    /// Shorthand for [`Error::InvalidModel`]
    pub fn invalid_model(msg: impl Into<String>) -> Self {
        Error::InvalidModel(msg.into())
    }
}
