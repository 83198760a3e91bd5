pub mod interp;

use serde_json::json;

use decorrelate::plan::SelectRef;
use decorrelate::rewrite::{decorrelate, Diagnostic};
use interp::{assert_same_rows, run, Database};

/// Customers, their orders and the line items of those orders. Customer 3
/// has no orders, which exercises the null-extension paths.
pub fn shop() -> Database {
    Database::default()
        .with_table(
            "customers",
            json!([
                { "id": 1, "name": "ada", "min_spend": 50 },
                { "id": 2, "name": "bo", "min_spend": 10 },
                { "id": 3, "name": "cy", "min_spend": 100 },
            ]),
        )
        .with_table(
            "orders",
            json!([
                { "id": 10, "cust": 1, "amount": 60, "date": 100 },
                { "id": 11, "cust": 1, "amount": 40, "date": 120 },
                { "id": 12, "cust": 2, "amount": 15, "date": 90 },
                { "id": 13, "cust": 2, "amount": 5, "date": 95 },
                { "id": 14, "cust": 2, "amount": 20, "date": 110 },
            ]),
        )
        .with_table(
            "items",
            json!([
                { "order_id": 10, "qty": 2 },
                { "order_id": 10, "qty": 1 },
                { "order_id": 12, "qty": 5 },
                { "order_id": 14, "qty": 3 },
            ]),
        )
}

/// Decorrelate `plan` and check that the rewritten plan produces the same
/// row multiset as the original over `db`.
pub fn assert_rewrite_equivalent(
    db: &Database,
    plan: &SelectRef,
) -> (SelectRef, Vec<Diagnostic>) {
    let (rewritten, diagnostics) = decorrelate(plan).expect("rewrite failed");
    decorrelate::validate::check(&rewritten).expect("rewritten plan is malformed");
    assert_same_rows(run(db, plan), run(db, &rewritten));
    (rewritten, diagnostics)
}
