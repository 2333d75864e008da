//! Embedded core schema for bootstrapping a registry.
//!
//! This module provides the standard LDAP syntaxes, matching rules,
//! attribute types and object classes (RFC 4512, RFC 4517, RFC 4519,
//! RFC 2798 and RFC 2307) as static definitions, so a usable [`Schema`] can
//! be built without external schema files.

use super::matching::MatchingAlgorithm;
use super::registry::{DefinitionKind, Schema, DIRECTORY_STRING_SYNTAX_OID};
use super::types::{MatchingRule, MatchingRuleKind, Syntax};
use crate::error::SchemaResult;
use log::debug;

const BOOLEAN: &str = "1.3.6.1.4.1.1466.115.121.1.7";
const DN: &str = "1.3.6.1.4.1.1466.115.121.1.12";
const GENERALIZED_TIME: &str = "1.3.6.1.4.1.1466.115.121.1.24";
const IA5_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.26";
const INTEGER: &str = "1.3.6.1.4.1.1466.115.121.1.27";
const NAME_AND_OPTIONAL_UID: &str = "1.3.6.1.4.1.1466.115.121.1.34";
const NUMERIC_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.36";
const OID: &str = "1.3.6.1.4.1.1466.115.121.1.38";
const OCTET_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.40";
const TELEPHONE_NUMBER: &str = "1.3.6.1.4.1.1466.115.121.1.50";

/// Name of the phonetic approximate matching rule.
pub const DOUBLE_METAPHONE_APPROX_NAME: &str = "ds-mr-double-metaphone-approx";
/// OID of the phonetic approximate matching rule.
pub const DOUBLE_METAPHONE_APPROX_OID: &str = "1.3.6.1.4.1.26027.1.4.1";

/// The Directory String syntax with its case-ignore default rules.
pub fn directory_string_syntax() -> Syntax {
    Syntax::new(
        DIRECTORY_STRING_SYNTAX_OID,
        "Directory String",
        Some("2.5.13.2"),
        Some("2.5.13.3"),
        Some("2.5.13.4"),
        Some(DOUBLE_METAPHONE_APPROX_OID),
    )
}

/// Returns the core attribute syntaxes.
pub fn core_syntaxes() -> Vec<Syntax> {
    vec![
        directory_string_syntax(),
        Syntax::new(BOOLEAN, "Boolean", Some("2.5.13.13"), None, None, None),
        Syntax::new(DN, "DN", Some("2.5.13.1"), None, None, None),
        Syntax::new(
            GENERALIZED_TIME,
            "Generalized Time",
            Some("2.5.13.27"),
            Some("2.5.13.28"),
            None,
            None,
        ),
        Syntax::new(
            IA5_STRING,
            "IA5 String",
            Some("1.3.6.1.4.1.1466.109.114.1"),
            None,
            Some("1.3.6.1.4.1.1466.109.114.3"),
            None,
        ),
        Syntax::new(INTEGER, "INTEGER", Some("2.5.13.14"), Some("2.5.13.15"), None, None),
        Syntax::new(
            NAME_AND_OPTIONAL_UID,
            "Name And Optional UID",
            Some("2.5.13.23"),
            None,
            None,
            None,
        ),
        Syntax::new(
            NUMERIC_STRING,
            "Numeric String",
            Some("2.5.13.8"),
            Some("2.5.13.9"),
            Some("2.5.13.10"),
            None,
        ),
        Syntax::new(OID, "OID", Some("2.5.13.0"), None, None, None),
        Syntax::new(
            OCTET_STRING,
            "Octet String",
            Some("2.5.13.17"),
            Some("2.5.13.18"),
            None,
            None,
        ),
        Syntax::new(
            TELEPHONE_NUMBER,
            "Telephone Number",
            Some("2.5.13.20"),
            None,
            Some("2.5.13.21"),
            None,
        ),
    ]
}

/// Returns the core matching rules.
pub fn core_matching_rules() -> Vec<MatchingRule> {
    use MatchingAlgorithm as A;
    use MatchingRuleKind::{Approximate, Equality, Ordering, Substring};

    let directory_string = DIRECTORY_STRING_SYNTAX_OID;
    [
        ("2.5.13.0", "objectIdentifierMatch", OID, Equality, A::ObjectIdentifier),
        ("2.5.13.1", "distinguishedNameMatch", DN, Equality, A::DistinguishedName),
        ("2.5.13.2", "caseIgnoreMatch", directory_string, Equality, A::CaseIgnore),
        ("2.5.13.3", "caseIgnoreOrderingMatch", directory_string, Ordering, A::CaseIgnore),
        ("2.5.13.4", "caseIgnoreSubstringsMatch", directory_string, Substring, A::CaseIgnore),
        ("2.5.13.5", "caseExactMatch", directory_string, Equality, A::CaseExact),
        ("2.5.13.6", "caseExactOrderingMatch", directory_string, Ordering, A::CaseExact),
        ("2.5.13.7", "caseExactSubstringsMatch", directory_string, Substring, A::CaseExact),
        ("2.5.13.8", "numericStringMatch", NUMERIC_STRING, Equality, A::NumericString),
        ("2.5.13.9", "numericStringOrderingMatch", NUMERIC_STRING, Ordering, A::NumericString),
        ("2.5.13.10", "numericStringSubstringsMatch", NUMERIC_STRING, Substring, A::NumericString),
        ("2.5.13.13", "booleanMatch", BOOLEAN, Equality, A::Boolean),
        ("2.5.13.14", "integerMatch", INTEGER, Equality, A::Integer),
        ("2.5.13.15", "integerOrderingMatch", INTEGER, Ordering, A::Integer),
        ("2.5.13.17", "octetStringMatch", OCTET_STRING, Equality, A::OctetString),
        ("2.5.13.18", "octetStringOrderingMatch", OCTET_STRING, Ordering, A::OctetString),
        ("2.5.13.20", "telephoneNumberMatch", TELEPHONE_NUMBER, Equality, A::TelephoneNumber),
        ("2.5.13.21", "telephoneNumberSubstringsMatch", TELEPHONE_NUMBER, Substring, A::TelephoneNumber),
        ("2.5.13.23", "uniqueMemberMatch", NAME_AND_OPTIONAL_UID, Equality, A::DistinguishedName),
        ("2.5.13.27", "generalizedTimeMatch", GENERALIZED_TIME, Equality, A::GeneralizedTime),
        ("2.5.13.28", "generalizedTimeOrderingMatch", GENERALIZED_TIME, Ordering, A::GeneralizedTime),
        ("1.3.6.1.4.1.1466.109.114.1", "caseExactIA5Match", IA5_STRING, Equality, A::CaseExactIa5),
        ("1.3.6.1.4.1.1466.109.114.2", "caseIgnoreIA5Match", IA5_STRING, Equality, A::CaseIgnoreIa5),
        ("1.3.6.1.4.1.1466.109.114.3", "caseIgnoreIA5SubstringsMatch", IA5_STRING, Substring, A::CaseIgnoreIa5),
        (DOUBLE_METAPHONE_APPROX_OID, DOUBLE_METAPHONE_APPROX_NAME, directory_string, Approximate, A::Phonetic),
    ]
    .into_iter()
    .map(|(oid, name, syntax, kind, algorithm)| MatchingRule::new(oid, name, syntax, kind, algorithm))
    .collect()
}

/// Returns the core attribute type definitions, superiors first.
pub fn core_attribute_types() -> &'static [&'static str] {
    &[
        "( 2.5.4.0 NAME 'objectClass' EQUALITY objectIdentifierMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.38 X-ORIGIN 'RFC 4512' )",
        "( 2.5.4.1 NAME 'aliasedObjectName' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 SINGLE-VALUE X-ORIGIN 'RFC 4512' )",
        "( 2.5.4.41 NAME 'name' EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15{32768} X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.49 NAME 'distinguishedName' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.3 NAME ( 'cn' 'commonName' ) SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.4 NAME ( 'sn' 'surname' ) SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.6 NAME ( 'c' 'countryName' ) SUP name SINGLE-VALUE X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.7 NAME ( 'l' 'localityName' ) SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.8 NAME ( 'st' 'stateOrProvinceName' ) SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.9 NAME ( 'street' 'streetAddress' ) EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.10 NAME ( 'o' 'organizationName' ) SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.11 NAME ( 'ou' 'organizationalUnitName' ) SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.12 NAME 'title' SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.13 NAME 'description' EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.17 NAME 'postalCode' EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.20 NAME 'telephoneNumber' EQUALITY telephoneNumberMatch SUBSTR telephoneNumberSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.50 X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.31 NAME 'member' SUP distinguishedName X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.32 NAME 'owner' SUP distinguishedName X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.33 NAME 'roleOccupant' SUP distinguishedName X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.34 NAME 'seeAlso' SUP distinguishedName X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.35 NAME 'userPassword' EQUALITY octetStringMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.40 X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.42 NAME 'givenName' SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.43 NAME 'initials' SUP name X-ORIGIN 'RFC 4519' )",
        "( 2.5.4.50 NAME 'uniqueMember' EQUALITY uniqueMemberMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.34 X-ORIGIN 'RFC 4519' )",
        "( 0.9.2342.19200300.100.1.1 NAME ( 'uid' 'userid' ) EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15{256} X-ORIGIN 'RFC 4519' )",
        "( 0.9.2342.19200300.100.1.3 NAME ( 'mail' 'rfc822Mailbox' ) EQUALITY caseIgnoreIA5Match SUBSTR caseIgnoreIA5SubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.26{256} X-ORIGIN 'RFC 4524' )",
        "( 0.9.2342.19200300.100.1.25 NAME ( 'dc' 'domainComponent' ) EQUALITY caseIgnoreIA5Match SUBSTR caseIgnoreIA5SubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 SINGLE-VALUE X-ORIGIN 'RFC 4519' )",
        "( 2.16.840.1.113730.3.1.3 NAME 'employeeNumber' EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 SINGLE-VALUE X-ORIGIN 'RFC 2798' )",
        "( 2.16.840.1.113730.3.1.241 NAME 'displayName' EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 SINGLE-VALUE X-ORIGIN 'RFC 2798' )",
        "( 1.3.6.1.1.1.1.0 NAME 'uidNumber' EQUALITY integerMatch ORDERING integerOrderingMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE X-ORIGIN 'RFC 2307' )",
        "( 1.3.6.1.1.1.1.1 NAME 'gidNumber' EQUALITY integerMatch ORDERING integerOrderingMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE X-ORIGIN 'RFC 2307' )",
        "( 1.3.6.1.1.1.1.3 NAME 'homeDirectory' EQUALITY caseExactIA5Match SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 SINGLE-VALUE X-ORIGIN 'RFC 2307' )",
        "( 1.3.6.1.1.1.1.4 NAME 'loginShell' EQUALITY caseExactIA5Match SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 SINGLE-VALUE X-ORIGIN 'RFC 2307' )",
        "( 1.3.6.1.1.1.1.12 NAME 'memberUid' EQUALITY caseExactIA5Match SUBSTR caseIgnoreIA5SubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 X-ORIGIN 'RFC 2307' )",
        "( 2.5.18.1 NAME 'createTimestamp' EQUALITY generalizedTimeMatch ORDERING generalizedTimeOrderingMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.24 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.18.2 NAME 'modifyTimestamp' EQUALITY generalizedTimeMatch ORDERING generalizedTimeOrderingMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.24 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.18.3 NAME 'creatorsName' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.18.4 NAME 'modifiersName' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.18.10 NAME 'subschemaSubentry' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 1.3.6.1.1.20 NAME 'entryDN' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation X-ORIGIN 'RFC 5020' )",
        "( 1.3.6.1.1.16.4 NAME 'entryUUID' EQUALITY caseIgnoreMatch ORDERING caseIgnoreOrderingMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation X-ORIGIN 'RFC 4530' )",
        "( 2.5.18.9 NAME 'hasSubordinates' EQUALITY booleanMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.7 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation X-ORIGIN 'X.501' )",
        "( 1.3.6.1.4.1.453.16.2.103 NAME 'numSubordinates' EQUALITY integerMatch ORDERING integerOrderingMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE NO-USER-MODIFICATION USAGE dSAOperation X-ORIGIN 'draft-ietf-boreham-numsubordinates' )",
        "( 2.16.840.1.113730.3.1.34 NAME 'ref' EQUALITY caseExactMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 USAGE distributedOperation X-ORIGIN 'RFC 3296' )",
        "( 2.5.21.1 NAME 'dITStructureRules' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.21.2 NAME 'dITContentRules' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.21.4 NAME 'matchingRules' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.21.5 NAME 'attributeTypes' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.21.6 NAME 'objectClasses' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.21.7 NAME 'nameForms' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 2.5.21.8 NAME 'matchingRuleUse' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
        "( 1.3.6.1.4.1.1466.101.120.16 NAME 'ldapSyntaxes' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE directoryOperation X-ORIGIN 'RFC 4512' )",
    ]
}

/// Returns the core object class definitions, superiors first.
pub fn core_object_classes() -> &'static [&'static str] {
    &[
        "( 2.5.6.0 NAME 'top' ABSTRACT MUST objectClass X-ORIGIN 'RFC 4512' )",
        "( 2.5.6.1 NAME 'alias' SUP top STRUCTURAL MUST aliasedObjectName X-ORIGIN 'RFC 4512' )",
        "( 1.3.6.1.4.1.1466.101.120.111 NAME 'extensibleObject' SUP top AUXILIARY X-ORIGIN 'RFC 4512' )",
        "( 2.5.20.1 NAME 'subschema' AUXILIARY MAY ( dITStructureRules $ nameForms $ dITContentRules $ objectClasses $ attributeTypes $ matchingRules $ matchingRuleUse ) X-ORIGIN 'RFC 4512' )",
        "( 2.16.840.1.113730.3.2.6 NAME 'referral' SUP top STRUCTURAL MUST ref X-ORIGIN 'RFC 3296' )",
        "( 2.16.840.1.113719.2.142.6.1.1 NAME 'ldapSubentry' SUP top STRUCTURAL MAY cn X-ORIGIN 'draft-ietf-ldup-subentry' )",
        "( 2.5.6.2 NAME 'country' SUP top STRUCTURAL MUST c MAY description X-ORIGIN 'RFC 4519' )",
        "( 2.5.6.3 NAME 'locality' SUP top STRUCTURAL MAY ( street $ seeAlso $ st $ l $ description ) X-ORIGIN 'RFC 4519' )",
        "( 2.5.6.4 NAME 'organization' SUP top STRUCTURAL MUST o MAY ( userPassword $ seeAlso $ telephoneNumber $ street $ postalCode $ st $ l $ description ) X-ORIGIN 'RFC 4519' )",
        "( 2.5.6.5 NAME 'organizationalUnit' SUP top STRUCTURAL MUST ou MAY ( userPassword $ seeAlso $ telephoneNumber $ street $ postalCode $ st $ l $ description ) X-ORIGIN 'RFC 4519' )",
        "( 2.5.6.6 NAME 'person' SUP top STRUCTURAL MUST ( sn $ cn ) MAY ( userPassword $ telephoneNumber $ seeAlso $ description ) X-ORIGIN 'RFC 4519' )",
        "( 2.5.6.7 NAME 'organizationalPerson' SUP person STRUCTURAL MAY ( title $ ou $ st $ l $ street $ postalCode ) X-ORIGIN 'RFC 4519' )",
        "( 2.5.6.9 NAME 'groupOfNames' SUP top STRUCTURAL MUST ( member $ cn ) MAY ( owner $ ou $ o $ description $ seeAlso ) X-ORIGIN 'RFC 4519' )",
        "( 2.5.6.17 NAME 'groupOfUniqueNames' SUP top STRUCTURAL MUST ( uniqueMember $ cn ) MAY ( owner $ ou $ o $ description $ seeAlso ) X-ORIGIN 'RFC 4519' )",
        "( 2.16.840.1.113730.3.2.2 NAME 'inetOrgPerson' SUP organizationalPerson STRUCTURAL MAY ( displayName $ employeeNumber $ givenName $ initials $ mail $ uid ) X-ORIGIN 'RFC 2798' )",
        "( 0.9.2342.19200300.100.4.13 NAME 'domain' SUP top STRUCTURAL MUST dc MAY ( userPassword $ seeAlso $ telephoneNumber $ street $ postalCode $ st $ l $ description $ o ) X-ORIGIN 'RFC 4524' )",
        "( 1.3.6.1.4.1.1466.344 NAME 'dcObject' SUP top AUXILIARY MUST dc X-ORIGIN 'RFC 4519' )",
        "( 1.3.6.1.1.1.2.0 NAME 'posixAccount' SUP top AUXILIARY MUST ( cn $ uid $ uidNumber $ gidNumber $ homeDirectory ) MAY ( userPassword $ loginShell $ description ) X-ORIGIN 'RFC 2307' )",
        "( 1.3.6.1.1.1.2.2 NAME 'posixGroup' SUP top STRUCTURAL MUST ( cn $ gidNumber ) MAY ( userPassword $ memberUid $ description ) X-ORIGIN 'RFC 2307' )",
    ]
}

/// Register the embedded core schema into `schema`.
pub fn load_core_schema(schema: &Schema) -> SchemaResult<()> {
    for syntax in core_syntaxes() {
        schema.register_syntax(syntax, false)?;
    }
    for rule in core_matching_rules() {
        schema.register_matching_rule(rule, false)?;
    }
    for definition in core_attribute_types() {
        schema.register_definition(DefinitionKind::AttributeType, definition, false)?;
    }
    for definition in core_object_classes() {
        schema.register_definition(DefinitionKind::ObjectClass, definition, false)?;
    }
    debug!(
        "Loaded core schema: {} attribute types, {} object classes",
        core_attribute_types().len(),
        core_object_classes().len()
    );
    Ok(())
}
