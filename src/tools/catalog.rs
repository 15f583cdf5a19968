//! 内置能力目录：侦察与 Web 测试常用命令
//!
//! 目标镜像内自带字典 /app/wordlists/common.txt。

use crate::tools::{Capability, CapabilityRegistry, RegistryError};

const WORDLIST: &str = "/app/wordlists/common.txt";
const HYDRA_SERVICES: [&str; 3] = ["ftp", "ssh", "http-post-form"];

fn nmap_scan(input: &str) -> String {
    format!("nmap -sV -T4 --open {input}")
}

fn gobuster_web_scan(input: &str) -> String {
    format!("gobuster dir -u {input} -w {WORDLIST} -t 50 --no-error")
}

fn dns_lookup(input: &str) -> String {
    format!("dig +short {input}")
}

fn ping_check(input: &str) -> String {
    format!("ping -c 4 {input}")
}

fn fetch_web_content(input: &str) -> String {
    format!("curl -sSL '{input}'")
}

fn whois_lookup(input: &str) -> String {
    format!("whois {input}")
}

fn whatweb_scan(input: &str) -> String {
    format!("whatweb '{input}'")
}

fn nikto_web_vuln_scan(input: &str) -> String {
    format!("nikto -Display 1234EP -o report.html -Format htm -Tuning 123bde -host '{input}'")
}

fn sqlmap_scan(input: &str) -> String {
    format!("sqlmap -u '{input}' --batch --level=1 --risk=1")
}

/// 输入格式 service,hostname,username；格式不对时构造一条 echo 报错命令，让错误进入 Observation
fn hydra_bruteforce(input: &str) -> String {
    let parts: Vec<&str> = input.trim().split(',').collect();
    let [service, hostname, username] = parts.as_slice() else {
        return "echo 'Error: Invalid input format. Expected: service,hostname,username'"
            .to_string();
    };
    if !HYDRA_SERVICES.contains(&service.trim()) {
        return format!(
            "echo 'Error: Unsupported service \"{service}\". Use ftp, ssh, or http-post-form.'"
        );
    }
    format!(
        "hydra -t 4 -l {} -P {WORDLIST} {}://{}",
        username.trim(),
        service.trim(),
        hostname.trim()
    )
}

fn subdomain_scan(input: &str) -> String {
    format!("gobuster dns -d {input} -w {WORDLIST} -t 50")
}

pub const CATALOG: [Capability; 11] = [
    Capability {
        name: "nmap_scan",
        description: "Performs a comprehensive Nmap scan on a target to discover open ports, running services, and their versions. The input must be a single IP address or a hostname.",
        construct: nmap_scan,
    },
    Capability {
        name: "gobuster_web_scan",
        description: "Discovers hidden directories and files on a web server using Gobuster. The input must be the full base URL of the target, including http/https. Example: 'http://www.pentest-ground.com'",
        construct: gobuster_web_scan,
    },
    Capability {
        name: "dns_lookup",
        description: "Performs a DNS lookup to find the IP address(es) for a given hostname. This is a fundamental first step in reconnaissance. The input must be a single hostname (e.g., 'www.pentest-ground.com').",
        construct: dns_lookup,
    },
    Capability {
        name: "ping_check",
        description: "Checks if a target host is online by sending ICMP packets. This is useful for verifying connectivity. The input must be a single IP address or hostname.",
        construct: ping_check,
    },
    Capability {
        name: "fetch_web_content",
        description: "Retrieves the full HTML content or data from a given URL. Excellent for grabbing homepages, API responses, or specific files. The input must be a full URL, including 'http://' or 'https://'.",
        construct: fetch_web_content,
    },
    Capability {
        name: "whois_lookup",
        description: "Retrieves domain registration information (owner, contact info, name servers) for a given domain name. The input must be a domain name (e.g., 'pentest-ground.com').",
        construct: whois_lookup,
    },
    Capability {
        name: "whatweb_scan",
        description: "Identifies technologies used on a website, including CMS, web server, JavaScript libraries, and more. The input must be a full URL.",
        construct: whatweb_scan,
    },
    Capability {
        name: "nikto_web_vuln_scan",
        description: "Scans a web server for over 6700 potentially dangerous files/CGIs, checks for outdated server versions, and other common web vulnerabilities. Can be 'noisy'. The input must be the full base URL.",
        construct: nikto_web_vuln_scan,
    },
    Capability {
        name: "sqlmap_scan",
        description: "Automates the process of detecting and exploiting SQL injection vulnerabilities. The input must be the FULL, specific URL that is suspected to be vulnerable, including all query parameters. Example: 'http://testphp.vulnweb.com/listproducts.php?cat=1'",
        construct: sqlmap_scan,
    },
    Capability {
        name: "hydra_bruteforce",
        description: "Performs a brute-force attack to find a valid password for a given user and service. The input MUST be a comma-separated string in the format: service,hostname,username. Supported services: ftp, ssh, http-post-form. The tool will automatically use the standard password list. Example: 'ftp,192.168.1.1,admin' or 'ssh,target.com,root'",
        construct: hydra_bruteforce,
    },
    Capability {
        name: "subdomain_scan",
        description: "Performs a DNS-based subdomain enumeration using a wordlist to discover hidden subdomains for a target. The input must be the root domain name, NOT a URL. Example: 'pentest-ground.com'",
        construct: subdomain_scan,
    },
];

/// 注册全部内置能力
pub fn default_registry() -> Result<CapabilityRegistry, RegistryError> {
    let mut registry = CapabilityRegistry::new();
    for capability in CATALOG {
        registry.register(capability)?;
    }
    tracing::info!("CapabilityRegistry initialized with {} tools.", registry.len());
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_all_capabilities() {
        let reg = default_registry().unwrap();
        assert_eq!(reg.len(), 11);
        assert_eq!(
            reg.construct("nmap_scan", "scanme.nmap.org").as_deref(),
            Some("nmap -sV -T4 --open scanme.nmap.org")
        );
        assert_eq!(
            reg.construct("fetch_web_content", "http://a.com").as_deref(),
            Some("curl -sSL 'http://a.com'")
        );
    }

    #[test]
    fn test_hydra_valid_input() {
        assert_eq!(
            hydra_bruteforce(" ssh, target.com , root "),
            "hydra -t 4 -l root -P /app/wordlists/common.txt ssh://target.com"
        );
    }

    #[test]
    fn test_hydra_unsupported_service() {
        assert_eq!(
            hydra_bruteforce("telnet,10.0.0.1,admin"),
            "echo 'Error: Unsupported service \"telnet\". Use ftp, ssh, or http-post-form.'"
        );
    }

    #[test]
    fn test_hydra_invalid_format() {
        let expected = "echo 'Error: Invalid input format. Expected: service,hostname,username'";
        assert_eq!(hydra_bruteforce("ssh,target.com"), expected);
        assert_eq!(hydra_bruteforce("a,b,c,d"), expected);
    }
}
