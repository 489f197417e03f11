use std::collections::BTreeSet;

use crate::admission_request::{AdmissionRequest, Operation};

/// Decides whether a hook looks at a request at all. Requests that are not
/// accepted are allowed untouched.
#[derive(Clone, Debug)]
pub struct RequestFilter {
    pub has_handler: bool,
    pub src_groups: BTreeSet<String>,
    pub kind: String,
}

impl RequestFilter {
    pub fn new<I, S>(has_handler: bool, src_groups: I, kind: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequestFilter {
            has_handler,
            src_groups: src_groups.into_iter().map(Into::into).collect(),
            kind: kind.into(),
        }
    }

    pub fn accepts(&self, req: &AdmissionRequest) -> bool {
        self.has_handler
            && matches!(
                req.operation,
                Operation::Create | Operation::Update | Operation::Delete
            )
            && !req.targets_sub_resource()
            && self.src_groups.contains(&req.kind.group)
            && req.kind.kind == self.kind
    }
}
