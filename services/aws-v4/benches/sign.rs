use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use awsign_aws_v4::Credential;
use awsign_aws_v4::RequestSigner;
use awsign_aws_v4::SignableBody;

criterion_group!(benches, bench);
criterion_main!(benches);

pub fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("aws_v4");

    let cred = Credential {
        access_key_id: "access_key_id".to_string(),
        secret_access_key: "secret_access_key".to_string(),
        ..Default::default()
    };

    group.bench_function("sign_header", |b| {
        let signer = RequestSigner::new("s3", "test");

        b.iter(|| {
            let mut req = http::Request::new("");
            *req.method_mut() = http::Method::GET;
            *req.uri_mut() = "http://127.0.0.1:9000/hello"
                .parse()
                .expect("url must be valid");

            let (mut parts, _) = req.into_parts();
            signer
                .sign(&mut parts, &cred, SignableBody::UnsignedPayload)
                .expect("must success")
        })
    });

    group.bench_function("presign", |b| {
        let signer = RequestSigner::new("s3", "test");

        b.iter(|| {
            let mut req = http::Request::new("");
            *req.method_mut() = http::Method::GET;
            *req.uri_mut() = "http://127.0.0.1:9000/hello"
                .parse()
                .expect("url must be valid");

            let (mut parts, _) = req.into_parts();
            signer
                .presign(&mut parts, &cred, std::time::Duration::from_secs(3600))
                .expect("must success")
        })
    });

    group.finish();
}
