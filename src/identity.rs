use log::info;
use tokio::sync::watch;

/// 認証済みユーザーのidを保持し、変更を購読できるようにする。
///
/// サインインやサインアウトの処理自体は外部の認証基盤が行い、その結果をここに反映する。
#[derive(Debug)]
pub struct Identity {
    sender: watch::Sender<Option<String>>,
}

impl Identity {
    /// 未サインインの`Identity`を返す。
    pub fn signed_out() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// 指定したユーザーでサインイン済みの`Identity`を返す。
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let identity = Self::signed_out();
        identity.sign_in(user_id);
        identity
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        info!("Signed in as {}", user_id);
        self.sender.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        info!("Signed out");
        self.sender.send_replace(None);
    }

    pub fn user_id(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    /// ユーザーidの変更を購読する。
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.sender.subscribe()
    }
}
