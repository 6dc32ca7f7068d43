//! 通知の購読管理

use core::fmt;

/// 購読を解除するためのハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback<T> = Box<dyn FnMut(&T)>;

/// 1 種類の通知の購読者リスト（登録順に呼ぶ）
pub(crate) struct Notifier<T> {
    subscribers: Vec<(SubscriptionId, Callback<T>)>,
}

impl<T> Notifier<T> {
    pub(crate) fn new() -> Self {
        Notifier {
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn subscribe(&mut self, id: SubscriptionId, callback: Callback<T>) {
        self.subscribers.push((id, callback));
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    pub(crate) fn notify(&mut self, value: &T) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(value);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_notify_in_subscription_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut notifier = Notifier::new();

        let a = seen.clone();
        notifier.subscribe(SubscriptionId(1), Box::new(move |v: &u32| a.borrow_mut().push(("a", *v))));
        let b = seen.clone();
        notifier.subscribe(SubscriptionId(2), Box::new(move |v: &u32| b.borrow_mut().push(("b", *v))));

        notifier.notify(&7);
        assert_eq!(*seen.borrow(), [("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut notifier: Notifier<u32> = Notifier::new();
        notifier.subscribe(SubscriptionId(1), Box::new(|_| {}));
        assert!(notifier.unsubscribe(SubscriptionId(1)));
        assert!(!notifier.unsubscribe(SubscriptionId(1)));
        assert_eq!(notifier.len(), 0);
    }
}
