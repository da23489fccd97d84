use payledger::domain::ids::InstructionId;
use payledger::domain::ledger::{self, LedgerAccount};
use payledger::domain::money::{Amount, Balance};
use payledger::domain::payment::Payment;
use payledger::domain::transaction::TransactionType;
use payledger::error::PaymentError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const PAYMENT_SIDE: [TransactionType; 5] = [
    TransactionType::Approve,
    TransactionType::ApproveAndDeposit,
    TransactionType::Deposit,
    TransactionType::ReverseApproval,
    TransactionType::ReverseDeposit,
];

fn assert_bounded(payment: &Payment) {
    let target = Balance::from(payment.target_amount);
    assert!(payment.approved_amount + payment.approving_amount <= target);
    assert!(payment.deposited_amount <= payment.approved_amount);
    for counter in [
        payment.approved_amount,
        payment.approving_amount,
        payment.deposited_amount,
        payment.depositing_amount,
        payment.reversing_approved_amount,
        payment.reversing_deposited_amount,
    ] {
        assert!(!counter.is_negative());
    }
}

#[test]
fn test_random_reserve_commit_never_exceeds_target() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..50 {
        let target = Decimal::new(rng.gen_range(1..=20_000), 2);
        let mut payment = Payment::new(InstructionId::new(), Amount::new(target).unwrap());

        for _ in 0..200 {
            let transaction_type = PAYMENT_SIDE[rng.gen_range(0..PAYMENT_SIDE.len())];
            let cents = rng.gen_range(1..=10_000);
            let requested = Amount::new(Decimal::new(cents, 2)).unwrap();

            match ledger::reserve(&mut payment, transaction_type, requested) {
                Ok(()) => {}
                Err(PaymentError::Overflow { .. }) => {
                    assert_bounded(&payment);
                    continue;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
            assert_bounded(&payment);

            if rng.gen_bool(0.2) {
                ledger::release(&mut payment, transaction_type, requested).unwrap();
            } else {
                let processed = Balance::new(Decimal::new(rng.gen_range(0..=cents), 2));
                let committed =
                    ledger::commit(&mut payment, transaction_type, requested, processed).unwrap();
                assert_eq!(committed, processed);
            }
            assert_bounded(&payment);
            assert!(payment.approving_amount.is_zero());
            assert!(payment.depositing_amount.is_zero());
        }
    }
}

#[test]
fn test_headroom_after_partial_commit() {
    let mut payment = Payment::new(InstructionId::new(), Amount::new(dec!(100.00)).unwrap());
    let requested = Amount::new(dec!(80.00)).unwrap();

    ledger::reserve(&mut payment, TransactionType::Approve, requested).unwrap();
    ledger::commit(
        &mut payment,
        TransactionType::Approve,
        requested,
        Balance::new(dec!(30.00)),
    )
    .unwrap();

    assert_eq!(
        payment.headroom(TransactionType::Approve),
        Some(Balance::new(dec!(70.00)))
    );
}
