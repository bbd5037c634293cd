// 🏢 Entity Mapper - LEIRecord → Company (+ Security, Succession)
//
// One LEI-CDF record becomes:
// 1. a Company node keyed `lei-<LEI>`
// 2. one Security node per ISIN mapped to the LEI
// 3. one Succession edge per SuccessorEntity carrying a SuccessorLEI
//
// Emission order is always Company, Securities (table order), Successions.

use crate::entities::{company_id, parse_date, security_id, succession_id, Entity};
use crate::error::{SkipReason, Warning};
use crate::pipeline::{Mapped, RecordMapper};
use crate::reference::ReferenceTables;
use crate::schema::Schema;
use crate::xml::Element;
use std::collections::HashSet;

pub const LEI_NAMESPACE: &str = "http://www.gleif.org/data/schema/leidata/2016";
pub const LEI_RECORD_TAG: &str = "LEIRecord";

/// RecordMapper for LEI-CDF files, joined against the reference tables
pub struct LeiRecordMapper<'a> {
    tables: &'a ReferenceTables,
}

impl<'a> LeiRecordMapper<'a> {
    pub fn new(tables: &'a ReferenceTables) -> Self {
        LeiRecordMapper { tables }
    }
}

impl RecordMapper for LeiRecordMapper<'_> {
    fn record_tag(&self) -> &'static str {
        LEI_RECORD_TAG
    }

    fn namespace(&self) -> &'static str {
        LEI_NAMESPACE
    }

    fn map(&self, record: &Element) -> Result<Mapped, SkipReason> {
        map_lei_record(record, self.tables)
    }

    fn record_key(&self, record: &Element) -> Option<String> {
        record.findtext("LEI").map(str::to_string)
    }
}

/// Map one namespace-free LEIRecord
///
/// LEI and Entity are required; every other element is optional and only
/// omits the properties it would have filled.
pub fn map_lei_record(record: &Element, tables: &ReferenceTables) -> Result<Mapped, SkipReason> {
    let lei = record.findtext("LEI").ok_or(SkipReason::MissingLei)?;
    let entity = record.child("Entity").ok_or(SkipReason::MissingEntity)?;

    let mut out = Mapped::default();
    let id = company_id(lei);
    let mut company = Entity::new(Schema::Company, id.clone());

    out.add(&mut company, "name", entity.findtext("LegalName"));
    for alias in entity
        .find_all("OtherEntityNames/OtherEntityName")
        .into_iter()
        .chain(entity.find_all("TransliteratedOtherEntityNames/TransliteratedOtherEntityName"))
    {
        out.add(&mut company, "alias", alias.text());
    }
    out.add(&mut company, "jurisdiction", entity.findtext("LegalJurisdiction"));
    out.add(&mut company, "country", entity.findtext("LegalAddress/Country"));
    out.add(&mut company, "status", entity.findtext("EntityStatus"));

    let created = parse_date(entity.findtext("EntityCreationDate"));
    out.add(&mut company, "incorporationDate", created.as_deref());

    out.add(
        &mut company,
        "registrationNumber",
        entity.findtext("RegistrationAuthority/RegistrationAuthorityEntityID"),
    );

    // Both the resolved ELF name and the free-text form are kept
    if let Some(code) = entity.findtext("LegalForm/EntityLegalFormCode") {
        out.add(&mut company, "legalForm", tables.legal_forms.get(code));
    }
    out.add(&mut company, "legalForm", entity.findtext("LegalForm/OtherLegalForm"));

    let modified = parse_date(record.findtext("Registration/LastUpdateDate"));
    out.add(&mut company, "modifiedAt", modified.as_deref());

    for bic in tables.bics.get(lei) {
        out.add(&mut company, "swiftBic", Some(bic.as_str()));
    }

    // leiCode takes the raw value even where the format check would refuse it
    if let Err(err) = company.add_unchecked("leiCode", lei) {
        out.warnings.push(Warning::from(err));
    }

    out.entities.push(company);

    let mut seen_isins = HashSet::new();
    for isin in tables.isins.get(lei) {
        if !seen_isins.insert(isin.as_str()) {
            continue;
        }
        let mut security = Entity::new(Schema::Security, security_id(isin));
        out.add(&mut security, "isin", Some(isin.as_str()));
        out.add(&mut security, "issuer", Some(id.as_str()));
        out.entities.push(security);
    }

    for successor in successors(record) {
        match successor.findtext("SuccessorLEI") {
            Some(successor_lei) => {
                let mut succession =
                    Entity::new(Schema::Succession, succession_id(lei, successor_lei));
                out.add(&mut succession, "predecessor", Some(lei));
                out.add(
                    &mut succession,
                    "successor",
                    Some(company_id(successor_lei).as_str()),
                );
                out.entities.push(succession);
            }
            None => out.warnings.push(Warning::SuccessorWithoutLei {
                lei: lei.to_string(),
            }),
        }
    }

    Ok(out)
}

/// SuccessorEntity elements: LEI-CDF 2.1 nests them in Entity, older
/// exports carry them on the record itself.
fn successors(record: &Element) -> Vec<&Element> {
    let nested = record.find_all("Entity/SuccessorEntity");
    if nested.is_empty() {
        record.find_all("SuccessorEntity")
    } else {
        nested
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{CodeMap, LegalForms};

    const LEI: &str = "5493001KJTIIGC8Y1R12";

    fn text(name: &str, value: &str) -> Element {
        Element::new(name).with_text(value)
    }

    fn base_entity() -> Element {
        Element::new("Entity")
            .with_child(text("LegalName", "Example AG"))
            .with_child(text("LegalJurisdiction", "DE"))
            .with_child(text("EntityStatus", "ACTIVE"))
    }

    fn base_record() -> Element {
        Element::new("LEIRecord")
            .with_child(text("LEI", LEI))
            .with_child(base_entity())
    }

    fn full_record() -> Element {
        let entity = base_entity()
            .with_child(text("EntityCreationDate", "1998-03-02T00:00:00+01:00"))
            .with_child(
                Element::new("OtherEntityNames")
                    .with_child(text("OtherEntityName", "Example Aktiengesellschaft")),
            )
            .with_child(Element::new("LegalAddress").with_child(text("Country", "DE")))
            .with_child(
                Element::new("RegistrationAuthority")
                    .with_child(text("RegistrationAuthorityID", "RA000197"))
                    .with_child(text("RegistrationAuthorityEntityID", "HRB 12345")),
            )
            .with_child(
                Element::new("LegalForm")
                    .with_child(text("EntityLegalFormCode", "6QQB"))
                    .with_child(text("OtherLegalForm", "AG")),
            );

        Element::new("LEIRecord")
            .with_child(text("LEI", LEI))
            .with_child(entity)
            .with_child(
                Element::new("Registration")
                    .with_child(text("InitialRegistrationDate", "2014-01-01T00:00:00Z"))
                    .with_child(text("LastUpdateDate", "2022-05-18T00:00:00Z")),
            )
    }

    fn tables() -> ReferenceTables {
        ReferenceTables::new(
            LegalForms::from_rows(vec![("6QQB", "Aktiengesellschaft")]),
            CodeMap::from_rows(vec![
                (LEI, Some("DEUTDEFFXXX")),
                (LEI, Some("DEUTDEFF500")),
            ]),
            CodeMap::from_rows(vec![
                (LEI, Some("DE0007164600")),
                (LEI, Some("DE0007164600")),
                (LEI, Some("DE000A1EWWW0")),
            ]),
        )
    }

    #[test]
    fn test_minimal_record_emits_one_company() {
        let mapped = map_lei_record(&base_record(), &ReferenceTables::empty()).unwrap();

        assert_eq!(mapped.entities.len(), 1);
        let company = &mapped.entities[0];
        assert_eq!(company.id, "lei-5493001KJTIIGC8Y1R12");
        assert_eq!(company.schema, Schema::Company);
        assert_eq!(company.first("name"), Some("Example AG"));
        assert_eq!(company.first("jurisdiction"), Some("DE"));
        assert_eq!(company.first("status"), Some("ACTIVE"));
        assert_eq!(company.first("leiCode"), Some(LEI));
        assert!(!company.has("swiftBic"));
        assert!(!company.has("registrationNumber"));
        assert!(!company.has("modifiedAt"));
        assert!(mapped.warnings.is_empty());
    }

    #[test]
    fn test_full_record_fields() {
        let mapped = map_lei_record(&full_record(), &tables()).unwrap();
        let company = &mapped.entities[0];

        assert_eq!(company.first("incorporationDate"), Some("1998-03-02"));
        assert_eq!(company.first("modifiedAt"), Some("2022-05-18"));
        assert_eq!(company.first("registrationNumber"), Some("HRB 12345"));
        assert_eq!(company.first("alias"), Some("Example Aktiengesellschaft"));
        assert_eq!(company.first("country"), Some("DE"));
        assert_eq!(company.get("swiftBic").unwrap().len(), 2);

        let forms = company.get("legalForm").unwrap();
        assert!(forms.contains("Aktiengesellschaft"));
        assert!(forms.contains("AG"));
    }

    #[test]
    fn test_securities_follow_company() {
        let mapped = map_lei_record(&full_record(), &tables()).unwrap();

        let schemas: Vec<Schema> = mapped.entities.iter().map(|e| e.schema).collect();
        assert_eq!(schemas, vec![Schema::Company, Schema::Security, Schema::Security]);

        let security = &mapped.entities[1];
        assert_eq!(security.id, "lei-isin-DE0007164600");
        assert_eq!(security.first("isin"), Some("DE0007164600"));
        assert_eq!(security.first("issuer"), Some("lei-5493001KJTIIGC8Y1R12"));
        assert_eq!(mapped.entities[2].id, "lei-isin-DE000A1EWWW0");
    }

    #[test]
    fn test_successor_emits_succession() {
        let successor = "99990000000000000099";
        let record = base_record().with_child(
            Element::new("SuccessorEntity").with_child(text("SuccessorLEI", successor)),
        );

        let mapped = map_lei_record(&record, &ReferenceTables::empty()).unwrap();
        assert_eq!(mapped.entities.len(), 2);

        let succession = &mapped.entities[1];
        assert_eq!(succession.schema, Schema::Succession);
        assert_eq!(
            succession.id,
            "lei-succession-5493001KJTIIGC8Y1R12-99990000000000000099"
        );
        assert_eq!(succession.first("predecessor"), Some(LEI));
        assert_eq!(succession.first("successor"), Some("lei-99990000000000000099"));
    }

    #[test]
    fn test_successor_nested_in_entity() {
        let entity = base_entity().with_child(
            Element::new("SuccessorEntity").with_child(text("SuccessorLEI", "B")),
        );
        let record = Element::new("LEIRecord")
            .with_child(text("LEI", "A"))
            .with_child(entity);

        let mapped = map_lei_record(&record, &ReferenceTables::empty()).unwrap();
        assert_eq!(mapped.entities[1].id, "lei-succession-A-B");
    }

    #[test]
    fn test_successor_without_lei_warns() {
        let record = base_record().with_child(
            Element::new("SuccessorEntity").with_child(text("SuccessorEntityName", "Newco AG")),
        );

        let mapped = map_lei_record(&record, &ReferenceTables::empty()).unwrap();
        assert_eq!(mapped.entities.len(), 1);
        assert_eq!(
            mapped.warnings,
            vec![Warning::SuccessorWithoutLei { lei: LEI.to_string() }]
        );
    }

    #[test]
    fn test_missing_lei_skips_record() {
        let record = Element::new("LEIRecord").with_child(base_entity());
        assert_eq!(
            map_lei_record(&record, &ReferenceTables::empty()).unwrap_err(),
            SkipReason::MissingLei
        );

        let blank = Element::new("LEIRecord")
            .with_child(text("LEI", "  "))
            .with_child(base_entity());
        assert_eq!(
            map_lei_record(&blank, &ReferenceTables::empty()).unwrap_err(),
            SkipReason::MissingLei
        );
    }

    #[test]
    fn test_missing_entity_skips_record() {
        let record = Element::new("LEIRecord").with_child(text("LEI", LEI));
        assert_eq!(
            map_lei_record(&record, &ReferenceTables::empty()).unwrap_err(),
            SkipReason::MissingEntity
        );
    }

    #[test]
    fn test_malformed_lei_still_sets_lei_code() {
        let record = Element::new("LEIRecord")
            .with_child(text("LEI", "not-a-lei"))
            .with_child(base_entity());

        let mapped = map_lei_record(&record, &ReferenceTables::empty()).unwrap();
        assert_eq!(mapped.entities[0].first("leiCode"), Some("not-a-lei"));
        assert!(mapped.warnings.is_empty());
    }

    #[test]
    fn test_invalid_date_is_dropped_with_warning() {
        let entity = base_entity().with_child(text("EntityCreationDate", "unknown"));
        let record = Element::new("LEIRecord")
            .with_child(text("LEI", LEI))
            .with_child(entity);

        let mapped = map_lei_record(&record, &ReferenceTables::empty()).unwrap();
        assert!(!mapped.entities[0].has("incorporationDate"));
        assert_eq!(mapped.warnings.len(), 1);
    }

    #[test]
    fn test_unknown_legal_form_code_keeps_other_form() {
        let entity = base_entity().with_child(
            Element::new("LegalForm")
                .with_child(text("EntityLegalFormCode", "8888"))
                .with_child(text("OtherLegalForm", "Stiftung")),
        );
        let record = Element::new("LEIRecord")
            .with_child(text("LEI", LEI))
            .with_child(entity);

        let mapped = map_lei_record(&record, &tables()).unwrap();
        let forms = mapped.entities[0].get("legalForm").unwrap();
        assert_eq!(forms.len(), 1);
        assert!(forms.contains("Stiftung"));
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let first = map_lei_record(&full_record(), &tables()).unwrap();
        let second = map_lei_record(&full_record(), &tables()).unwrap();

        assert_eq!(first, second);
        let fingerprints = |m: &Mapped| m.entities.iter().map(Entity::fingerprint).collect::<Vec<_>>();
        assert_eq!(fingerprints(&first), fingerprints(&second));
    }
}
