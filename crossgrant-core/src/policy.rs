//! Builders for the three authorization documents a grant needs, and the
//! merge/demerge of grant statements into a shared bucket policy.

use crossgrant_spec::{PolicyDocument, Principal, Statement};

const STS_ASSUME_ROLE: &str = "sts:AssumeRole";

const SOURCE_READ_ACTIONS: &[&str] = &[
    "s3:ListBucket",
    "s3:GetObject",
    "s3:GetObjectTagging",
    "s3:GetObjectVersion",
    "s3:GetObjectVersionTagging",
];

const DESTINATION_WRITE_ACTIONS: &[&str] = &[
    "s3:ListBucket",
    "s3:PutObject",
    "s3:PutObjectAcl",
    "s3:PutObjectTagging",
    "s3:GetObjectTagging",
    "s3:GetObjectVersion",
    "s3:GetObjectVersionTagging",
];

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

pub fn object_arn(bucket: &str, object: &str) -> String {
    format!("arn:aws:s3:::{bucket}/{object}")
}

fn all_objects_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}/*")
}

/// Trust policy letting exactly `principal_arn` assume the role.
pub fn trust_policy(principal_arn: &str) -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement::allow()
            .with_principal(Principal::aws(principal_arn))
            .with_action(STS_ASSUME_ROLE),
    ])
}

/// Role policy: read the source object, write the destination object.
pub fn cross_account_role_policy(
    source_bucket: &str,
    source_object: &str,
    destination_bucket: &str,
    destination_object: &str,
) -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement::allow()
            .with_actions(SOURCE_READ_ACTIONS)
            .with_resources(vec![
                bucket_arn(source_bucket),
                object_arn(source_bucket, source_object),
            ]),
        Statement::allow()
            .with_actions(DESTINATION_WRITE_ACTIONS)
            .with_resources(vec![
                bucket_arn(destination_bucket),
                object_arn(destination_bucket, destination_object),
            ]),
    ])
}

/// Stand-in for a bucket that has no policy yet.
pub fn empty_bucket_policy() -> PolicyDocument {
    PolicyDocument::new(Vec::new())
}

/// Bucket-policy statement allowing `principal_arn` to write into the bucket.
pub fn bucket_policy_statement(sid: &str, principal_arn: &str, destination_bucket: &str) -> Statement {
    Statement::allow()
        .with_sid(sid)
        .with_principal(Principal::aws(principal_arn))
        .with_actions(DESTINATION_WRITE_ACTIONS)
        .with_resources(vec![
            bucket_arn(destination_bucket),
            all_objects_arn(destination_bucket),
        ])
}

/// Add `statement` to the document. Other statements keep their position;
/// an existing statement with the same Sid is replaced where it stands and
/// any further duplicates of that Sid are dropped. Returns true when a
/// statement was replaced rather than appended.
pub fn merge_statement(document: &mut PolicyDocument, statement: Statement) -> bool {
    let Some(sid) = statement.sid.clone() else {
        document.statements.push(statement);
        return false;
    };

    let mut replacement = Some(statement);
    let mut replaced = false;
    let existing = std::mem::take(&mut document.statements);
    for current in existing {
        if !current.has_sid(&sid) {
            document.statements.push(current);
        } else if let Some(new) = replacement.take() {
            document.statements.push(new);
            replaced = true;
        }
    }
    if let Some(new) = replacement {
        document.statements.push(new);
    }
    replaced
}

/// Drop every statement whose Sid equals `sid`, keeping all others (also
/// those without a Sid) in their original order. Returns how many were removed.
pub fn remove_statements(document: &mut PolicyDocument, sid: &str) -> usize {
    let before = document.statements.len();
    document.statements.retain(|statement| !statement.has_sid(sid));
    before - document.statements.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossgrant_spec::POLICY_VERSION;
    use serde_json::{Value, json};

    fn sid_statement(sid: &str) -> Statement {
        bucket_policy_statement(sid, &format!("arn:aws:iam::1:role/{sid}"), "dst")
    }

    fn sids(document: &PolicyDocument) -> Vec<Option<&str>> {
        document
            .statements
            .iter()
            .map(|statement| statement.sid.as_deref())
            .collect()
    }

    #[test]
    fn trust_policy_allows_only_the_caller() {
        let value = serde_json::to_value(trust_policy("arn:aws:iam::111:user/mover")).unwrap();
        assert_eq!(
            value,
            json!({
                "Version": POLICY_VERSION,
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": {"AWS": "arn:aws:iam::111:user/mover"},
                    "Action": "sts:AssumeRole"
                }]
            })
        );
    }

    #[test]
    fn role_policy_scopes_to_the_two_objects() {
        let value = serde_json::to_value(cross_account_role_policy("src", "a.txt", "dst", "b/a.txt")).unwrap();
        let statements = value["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0]["Resource"],
            json!(["arn:aws:s3:::src", "arn:aws:s3:::src/a.txt"])
        );
        assert_eq!(statements[0]["Action"].as_array().unwrap().len(), 5);
        assert_eq!(
            statements[1]["Resource"],
            json!(["arn:aws:s3:::dst", "arn:aws:s3:::dst/b/a.txt"])
        );
        assert!(statements[1]["Action"]
            .as_array()
            .unwrap()
            .contains(&json!("s3:PutObjectAcl")));
        assert!(statements.iter().all(|s| s.get("Principal").is_none()));
    }

    #[test]
    fn bucket_statement_grants_write_on_the_whole_bucket() {
        let value = serde_json::to_value(bucket_policy_statement(
            "edc-transfer_1",
            "arn:aws:iam::111:role/edc-transfer_1",
            "dst",
        ))
        .unwrap();
        assert_eq!(value["Sid"], json!("edc-transfer_1"));
        assert_eq!(
            value["Principal"],
            json!({"AWS": "arn:aws:iam::111:role/edc-transfer_1"})
        );
        assert_eq!(
            value["Resource"],
            json!(["arn:aws:s3:::dst", "arn:aws:s3:::dst/*"])
        );
        assert_eq!(value["Action"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn empty_policy_has_version_and_no_statements() {
        let value: Value = serde_json::from_str(&empty_bucket_policy().to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"Version": POLICY_VERSION, "Statement": []}));
    }

    #[test]
    fn builder_documents_round_trip() {
        let documents = [
            trust_policy("arn:aws:iam::1:user/u"),
            cross_account_role_policy("s", "o", "d", "p"),
            empty_bucket_policy(),
            PolicyDocument::new(vec![sid_statement("X")]),
        ];
        for document in documents {
            let parsed = PolicyDocument::from_json(&document.to_json().unwrap()).unwrap();
            assert_eq!(parsed, document);
        }
    }

    #[test]
    fn merge_appends_after_existing_statements() {
        let mut document = PolicyDocument::new(vec![sid_statement("A"), sid_statement("B")]);
        let replaced = merge_statement(&mut document, sid_statement("X"));

        assert!(!replaced);
        assert_eq!(sids(&document), vec![Some("A"), Some("B"), Some("X")]);
    }

    #[test]
    fn merge_replaces_statement_with_same_sid_in_place() {
        let mut document = PolicyDocument::new(vec![
            sid_statement("X"),
            sid_statement("A"),
            sid_statement("X"),
        ]);
        let fresh = bucket_policy_statement("X", "arn:aws:iam::1:role/fresh", "dst");
        let replaced = merge_statement(&mut document, fresh.clone());

        assert!(replaced);
        assert_eq!(sids(&document), vec![Some("X"), Some("A")]);
        assert_eq!(document.statements[0], fresh);
    }

    #[test]
    fn demerge_keeps_others_in_order() {
        for order in [["X", "A", "B"], ["A", "X", "B"], ["A", "B", "X"]] {
            let mut document =
                PolicyDocument::new(order.iter().map(|sid| sid_statement(sid)).collect());
            assert_eq!(remove_statements(&mut document, "X"), 1);
            assert_eq!(sids(&document), vec![Some("A"), Some("B")]);
        }
    }

    #[test]
    fn demerge_never_touches_statements_without_sid() {
        let anonymous = Statement::allow()
            .with_action("s3:GetObject")
            .with_resources(vec!["arn:aws:s3:::dst/*".into()]);
        let mut document = PolicyDocument::new(vec![anonymous.clone(), sid_statement("X")]);

        assert_eq!(remove_statements(&mut document, "X"), 1);
        assert_eq!(document.statements, vec![anonymous]);
    }

    #[test]
    fn demerge_of_sole_statement_leaves_empty_document() {
        let mut document = PolicyDocument::new(vec![sid_statement("X")]);
        remove_statements(&mut document, "X");
        assert!(document.is_empty());
    }
}
