use crate::domain::advance::AdvancePayment;
use crate::error::Result;
use std::io::Write;

/// Writes an installment schedule as
/// `advance_id,payment_number,amount,due_at,status`.
pub struct ScheduleWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ScheduleWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments<'a>(
        &mut self,
        payments: impl IntoIterator<Item = &'a AdvancePayment>,
    ) -> Result<()> {
        for payment in payments {
            self.writer.serialize(payment)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Amount;
    use crate::domain::advance::PaymentStatus;
    use chrono::DateTime;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_schedule() {
        let payment = AdvancePayment {
            advance_id: 3,
            payment_number: 0,
            amount: Amount::new(dec!(100)).unwrap(),
            due_at: DateTime::from_timestamp(604_800, 0).unwrap(),
            status: PaymentStatus::NotDueYet,
        };

        let mut out = Vec::new();
        ScheduleWriter::new(&mut out)
            .write_payments([&payment])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "advance_id,payment_number,amount,due_at,status\n3,0,100,1970-01-08T00:00:00Z,not_due_yet\n"
        );
    }
}
